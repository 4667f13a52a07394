//! Router configuration for the vector tile server.
//!
//! # Route Structure
//!
//! ```text
//! /health_check                                      - Health check
//! /tilezen/vector/v1/all/{z}/{x}/{y}.{fmt}           - 256px tile
//! /tilezen/vector/v1/{size}/all/{z}/{x}/{y}.{fmt}    - Tile at a pixel size
//! /tilezen/vector/v1[/{size}]/all/tilejson.{fmt}.json - TileJSON
//! ```
//!
//! Tile and TileJSON paths share a catch-all route and are told apart by the
//! handler.
//!
//! # Example
//!
//! ```ignore
//! use metatile_server::server::{create_router, RouterConfig};
//!
//! let config = RouterConfig::new()
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(tile_service, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{routing::get, Router};
use http::header::{CONTENT_TYPE, IF_MODIFIED_SINCE, IF_NONE_MATCH};
use http::{Extensions, HeaderMap, Method, StatusCode, Version};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    health_check_handler, sized_vector_handler, vector_handler, AppState, CacheControl,
};
use crate::store::ArchiveStore;
use crate::tile::TileService;

/// Content types worth compressing; tiles in other formats are left alone.
const COMPRESSIBLE_TYPES: [&str; 2] = ["application/json", "application/x-protobuf"];

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control directives for tiles
    pub cache_control: CacheControl,

    /// Base URL for TileJSON tile templates
    pub tiles_url_base: String,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl RouterConfig {
    /// Create a new router configuration.
    ///
    /// By default:
    /// - CORS allows any origin
    /// - Cache-Control is `public, max-age=1200, s-maxage=600`
    /// - TileJSON URLs are relative to the host
    /// - Tracing is enabled
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            cache_control: CacheControl::default(),
            tiles_url_base: String::new(),
            enable_tracing: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    /// Pass None (or don't call this method) to allow any origin.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    pub fn with_cache_control(mut self, cache_control: CacheControl) -> Self {
        self.cache_control = cache_control;
        self
    }

    pub fn with_tiles_url_base(mut self, base: impl Into<String>) -> Self {
        self.tiles_url_base = base.into();
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
///
/// This function builds the complete Axum router with:
/// - Tile, TileJSON and health check routes
/// - CORS configuration
/// - Gzip compression of JSON and protobuf responses
/// - Request tracing (optional)
pub fn create_router<S>(tile_service: TileService<S>, config: RouterConfig) -> Router
where
    S: ArchiveStore + 'static,
{
    let app_state = AppState::new(tile_service)
        .with_cache_control(config.cache_control)
        .with_tiles_url_base(config.tiles_url_base.clone());

    let cors = build_cors_layer(&config);

    let router = Router::new()
        .route("/health_check", get(health_check_handler::<S>))
        .route("/tilezen/vector/v1/all/{*path}", get(vector_handler::<S>))
        .route(
            "/tilezen/vector/v1/{pixel_size}/all/{*path}",
            get(sized_vector_handler::<S>),
        )
        .with_state(app_state)
        .layer(build_compression_layer())
        .layer(cors);

    // Add tracing if enabled
    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, IF_MODIFIED_SINCE, IF_NONE_MATCH])
        .max_age(Duration::from_secs(86400)); // 24 hours

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => {
            // No origins allowed - this effectively disables CORS
            cors
        }
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

/// Gzip responses whose content type is JSON or protobuf.
fn build_compression_layer() -> CompressionLayer<
    impl Fn(StatusCode, Version, &HeaderMap, &Extensions) -> bool + Clone,
> {
    CompressionLayer::new().compress_when(
        |_status: StatusCode, _version: Version, headers: &HeaderMap, _ext: &Extensions| {
            is_compressible(headers)
        },
    )
}

fn is_compressible(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| COMPRESSIBLE_TYPES.iter().any(|t| ct.starts_with(t)))
        .unwrap_or(false)
}

// =============================================================================
// Tests
// =============================================================================
