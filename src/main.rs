//! Metatile Server - Vector tiles carved out of zipped metatiles.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metatile_server::{
    config::Config,
    server::create_router,
    store::{create_s3_client, S3ArchiveStore},
    tile::TileService,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    // Initialize logging
    init_logging(config.verbose);

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let geometry = match config.geometry() {
        Ok(geometry) => geometry,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let layout = config.key_layout();

    info!("Metatile Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  S3 bucket: {}", config.s3_bucket);
    if let Some(ref endpoint) = config.s3_endpoint {
        info!("  S3 endpoint: {}", endpoint);
    }
    info!("  S3 region: {}", config.s3_region);
    info!(
        "  Keys: format={}, prefix={}, layer={}",
        layout.format,
        layout.prefix.as_deref().unwrap_or("-"),
        layout.layer.as_deref().unwrap_or("-")
    );
    info!(
        "  Metatiles: size={}, max detail zoom={}",
        geometry.metatile_size(),
        geometry
            .max_detail_zoom()
            .map(|z| z.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    if config.requester_pays {
        info!("  Requester pays: enabled");
    }

    let tile_cache = config.tile_cache();
    if tile_cache.is_none() {
        warn!("  Tile cache: DISABLED - every request extracts from its metatile");
    }
    info!(
        "  Cache: {} metatiles, {}MB tiles",
        config.metatile_cache_entries,
        config.tile_cache_bytes / (1024 * 1024)
    );

    // Create S3 client and store
    let s3_client = create_s3_client(config.s3_endpoint.as_deref(), &config.s3_region).await;
    let store = S3ArchiveStore::new(s3_client, config.s3_bucket.clone());

    // Create tile service
    let tile_service = TileService::new(store, geometry, layout)
        .with_requester_pays(config.requester_pays)
        .with_archive_cache(config.archive_cache())
        .with_tile_cache(tile_cache);

    // Create router
    let router = create_router(tile_service, config.router_config());

    // Bind and serve
    let addr = config.bind_address();

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Server listening on: http://{}", addr);
    info!("  curl http://{}/health_check", addr);
    info!("  curl http://{}/tilezen/vector/v1/all/0/0/0.mvt", addr);

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "metatile_server=debug,tower_http=debug"
    } else {
        "metatile_server=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
