//! Cache effectiveness integration tests.
//!
//! Tests verify:
//! - Metatile cache avoids repeat fetches for the same and sibling tiles
//! - Not-modified answers leave the caches untouched
//! - Cache sizes stay within their bounds
//! - Concurrent requests all succeed

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use metatile_server::archive::ArchiveCache;
use metatile_server::coord::TileFormat;
use metatile_server::store::CacheValidators;
use metatile_server::tile::{TileOutcome, TileRequest};
use metatile_server::{create_router, RouterConfig};

use super::test_utils::{fixture_store, tracked_service};

fn expect_tile(outcome: TileOutcome) -> Vec<u8> {
    match outcome {
        TileOutcome::Tile(tile) => tile.data.to_vec(),
        TileOutcome::NotModified => panic!("Expected a tile, got NotModified"),
    }
}

// =============================================================================
// Metatile Cache Effectiveness
// =============================================================================

#[tokio::test]
async fn test_repeat_request_hits_metatile_cache() {
    let store = fixture_store();
    let router = create_router(tracked_service(&store), RouterConfig::new());

    // First request - cache miss
    let request1 = Request::builder()
        .uri("/tilezen/vector/v1/all/0/0/0.mvt")
        .body(Body::empty())
        .unwrap();
    let response1 = router.clone().oneshot(request1).await.unwrap();
    assert_eq!(response1.status(), StatusCode::OK);
    assert_eq!(
        response1.headers().get("x-metatile-cache-hit").unwrap(),
        "false"
    );

    // Second request - cache hit
    let request2 = Request::builder()
        .uri("/tilezen/vector/v1/all/0/0/0.mvt")
        .body(Body::empty())
        .unwrap();
    let response2 = router.oneshot(request2).await.unwrap();
    assert_eq!(response2.status(), StatusCode::OK);
    assert_eq!(
        response2.headers().get("x-metatile-cache-hit").unwrap(),
        "true"
    );

    // Cached responses keep the metatile's validators
    assert_eq!(response2.headers().get(header::ETAG).unwrap(), "\"abc\"");

    let body = response2.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"world tile");

    assert_eq!(store.fetch_count(), 1);
}

#[tokio::test]
async fn test_sibling_tiles_share_one_fetch() {
    let store = fixture_store();
    let service = tracked_service(&store);
    let none = CacheValidators::default();

    // All three live in the world metatile
    let requests = [
        TileRequest::new(0, 0, 0, TileFormat::Mvt),
        TileRequest::new(1, 1, 0, TileFormat::Mvt),
        TileRequest::new(2, 3, 2, TileFormat::Mvt),
    ];
    for request in &requests {
        service.retrieve(request, &none).await.unwrap();
    }

    assert_eq!(store.fetch_count(), 1);
}

#[tokio::test]
async fn test_pixel_sizes_share_metatiles() {
    let store = fixture_store();
    let service = tracked_service(&store);
    let none = CacheValidators::default();

    let small = TileRequest::new(0, 0, 0, TileFormat::Mvt);
    let large = TileRequest::with_pixel_size(0, 0, 0, TileFormat::Mvt, 1024);

    let small_tile = expect_tile(service.retrieve(&small, &none).await.unwrap());
    let large_tile = expect_tile(service.retrieve(&large, &none).await.unwrap());

    assert_eq!(small_tile, large_tile);
    assert_eq!(store.fetch_count(), 1);
}

#[tokio::test]
async fn test_cached_metatile_ignores_client_validators() {
    let store = fixture_store().with_not_modified();
    let service = tracked_service(&store);

    let request = TileRequest::new(0, 0, 0, TileFormat::Mvt);
    service
        .retrieve(&request, &CacheValidators::default())
        .await
        .unwrap();

    // The metatile is cached, so the conditional headers never reach the store
    let validators = CacheValidators::new(None, Some("\"abc\"".to_string()));
    let outcome = service.retrieve(&request, &validators).await.unwrap();

    assert_eq!(expect_tile(outcome), b"world tile");
    assert_eq!(store.fetch_count(), 1);
}

#[tokio::test]
async fn test_not_modified_is_not_cached() {
    let store = fixture_store().with_not_modified();
    let service = tracked_service(&store);
    let request = TileRequest::new(0, 0, 0, TileFormat::Mvt);

    let validators = CacheValidators::new(None, Some("\"abc\"".to_string()));
    let outcome = service.retrieve(&request, &validators).await.unwrap();
    assert!(matches!(outcome, TileOutcome::NotModified));

    service.sync_caches().await;
    let stats = service.cache_stats();
    assert_eq!(stats.archive_entries, 0);
    assert_eq!(stats.tile_entries, 0);

    // An unconditional request has to go back to the store
    let outcome = service
        .retrieve(&request, &CacheValidators::default())
        .await
        .unwrap();
    assert_eq!(expect_tile(outcome), b"world tile");
    assert_eq!(store.fetch_count(), 2);
}

#[tokio::test]
async fn test_missing_metatile_is_not_cached() {
    let store = fixture_store();
    let service = tracked_service(&store);
    let none = CacheValidators::default();

    // 3/0/0 lives in metatile 1/0/0, which does not exist
    let request = TileRequest::new(3, 0, 0, TileFormat::Mvt);
    assert!(service.retrieve(&request, &none).await.is_err());
    assert!(service.retrieve(&request, &none).await.is_err());

    assert_eq!(store.fetch_count(), 2);
}

// =============================================================================
// Cache Bounds
// =============================================================================

#[tokio::test]
async fn test_cache_stats_after_requests() {
    let store = fixture_store();
    let service = tracked_service(&store);
    let none = CacheValidators::default();

    service
        .retrieve(&TileRequest::new(0, 0, 0, TileFormat::Mvt), &none)
        .await
        .unwrap();
    service
        .retrieve(&TileRequest::new(3, 5, 6, TileFormat::Mvt), &none)
        .await
        .unwrap();
    service.sync_caches().await;

    let stats = service.cache_stats();
    assert_eq!(stats.archive_entries, 2);
    assert_eq!(stats.tile_entries, 2);
    assert_eq!(stats.tile_bytes, (b"world tile".len() + b"zoom three tile".len()) as u64);
}

#[tokio::test]
async fn test_metatile_cache_stays_bounded() {
    let store = fixture_store();
    let service = tracked_service(&store).with_archive_cache(ArchiveCache::new(1));
    let none = CacheValidators::default();

    for request in [
        TileRequest::new(0, 0, 0, TileFormat::Mvt),
        TileRequest::new(3, 5, 6, TileFormat::Mvt),
        TileRequest::new(0, 0, 0, TileFormat::Json),
    ] {
        service.retrieve(&request, &none).await.unwrap();
    }
    service.sync_caches().await;

    let stats = service.cache_stats();
    assert_eq!(stats.archive_capacity, 1);
    assert!(stats.archive_entries <= 1);
}

#[tokio::test]
async fn test_tile_cache_can_be_disabled() {
    let store = fixture_store();
    let service = tracked_service(&store).with_tile_cache(None);
    let request = TileRequest::new(2, 3, 2, TileFormat::Mvt);
    let none = CacheValidators::default();

    let first = expect_tile(service.retrieve(&request, &none).await.unwrap());
    let second = expect_tile(service.retrieve(&request, &none).await.unwrap());

    assert_eq!(first, b"zoom two tile");
    assert_eq!(first, second);

    service.sync_caches().await;
    assert_eq!(service.cache_stats().tile_entries, 0);
    assert_eq!(service.cache_stats().tile_bytes, 0);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_concurrent_requests_succeed() {
    let store = fixture_store();
    let service = Arc::new(tracked_service(&store));

    let mut handles = Vec::new();
    for i in 0..16 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            let request = if i % 2 == 0 {
                TileRequest::new(0, 0, 0, TileFormat::Mvt)
            } else {
                TileRequest::new(3, 5, 6, TileFormat::Mvt)
            };
            let outcome = service
                .retrieve(&request, &CacheValidators::default())
                .await
                .unwrap();
            (i, expect_tile(outcome))
        }));
    }

    for handle in handles {
        let (i, tile) = handle.await.unwrap();
        let expected: &[u8] = if i % 2 == 0 {
            b"world tile"
        } else {
            b"zoom three tile"
        };
        assert_eq!(tile, expected);
    }

    // Without request coalescing each metatile is fetched at least once
    assert!(store.fetch_count() >= 2);
}
