//! # Metatile Server
//!
//! A vector tile server for tiles packed into zipped metatiles in S3-compatible
//! object storage.
//!
//! Each metatile is a zip archive covering a square block of the tile quadtree.
//! A request for `z/x/y.fmt` is mapped onto the metatile that contains it, the
//! metatile is fetched (or taken from memory) and the single tile is extracted
//! and served with HTTP caching headers.
//!
//! ## Features
//!
//! - **Metatile addressing**: Serves 256px tiles and larger tile sizes from the same metatiles
//! - **Flexible key layouts**: Hash-prefixed, prefix-hashed or unhashed S3 keys
//! - **Conditional requests**: `If-Modified-Since`/`If-None-Match` pass through to S3
//! - **Two-level caching**: Recent metatiles and extracted tiles are kept in memory
//! - **TileJSON**: Describes each tile size's endpoint
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`coord`] - Tile coordinates and metatile geometry
//! - [`store`] - Key layouts and the S3 metatile store
//! - [`archive`] - Zip extraction and the metatile cache
//! - [`tile`] - Tile service and extracted tile cache
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use metatile_server::{
//!     create_router, create_s3_client, KeyFormat, KeyLayout, MetatileGeometry, RouterConfig,
//!     S3ArchiveStore, TileService,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = create_s3_client(None, "us-east-1").await;
//!     let store = S3ArchiveStore::new(client, "my-tiles");
//!
//!     let geometry = MetatileGeometry::new(4, None)?;
//!     let layout = KeyLayout::new(Some("20240101".to_string()), None, KeyFormat::PrefixHash);
//!
//!     let service = TileService::new(store, geometry, layout);
//!     let router = create_router(service, RouterConfig::new());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod config;
pub mod coord;
pub mod error;
pub mod server;
pub mod store;
pub mod tile;

// Re-export commonly used types
pub use archive::{ArchiveCache, MetatileArchive};
pub use config::Config;
pub use coord::{resolve, MetatileGeometry, OffsetCoord, TileCoord, TileFormat};
pub use error::{ArchiveError, CoordError, GeometryError, StoreError, TileError};
pub use server::{create_router, AppState, CacheControl, ErrorResponse, RouterConfig, TileJson};
pub use store::{
    build_key, create_s3_client, ArchiveStore, CacheValidators, FetchOutcome, KeyFormat,
    KeyLayout, S3ArchiveStore, StoredBlob,
};
pub use tile::{
    CacheStats, TileCache, TileCacheKey, TileOutcome, TileRequest, TileResponse, TileService,
    DEFAULT_TILE_CACHE_CAPACITY,
};
