//! Configuration management for the metatile server.
//!
//! Every option can be given on the command line or through the environment
//! variable listed next to it:
//!
//! - `HOST` - Server bind address (default: 0.0.0.0)
//! - `PORT` - Server port (default: 8080)
//! - `S3_BUCKET` - S3 bucket holding metatiles (required)
//! - `S3_PREFIX` - Key prefix in front of every metatile
//! - `S3_LAYER` - Layer name included in keys (legacy layouts)
//! - `S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `S3_REGION` - AWS region (default: us-east-1)
//! - `REQUESTER_PAYS` - Bill metatile reads to this account (default: false)
//! - `KEY_FORMAT_TYPE` - `no-hash`, `hash-prefix` or `prefix-hash`
//! - `INCLUDE_HASH` - Legacy switch, `false` selects `no-hash` (default: true)
//! - `METATILE_SIZE` - Metatile edge in 256px tiles (default: 4)
//! - `METATILE_MAX_DETAIL_ZOOM` - Zoom past which larger tiles come from shallower metatiles
//! - `METATILE_CACHE_ENTRIES` - Metatiles kept in memory (default: 32)
//! - `TILE_CACHE_BYTES` - Extracted tile cache size, 0 disables (default: 64MB)
//! - `CACHE_MAX_AGE` - `Cache-Control: max-age` seconds (default: 1200)
//! - `SHARED_CACHE_MAX_AGE` - `s-maxage` seconds, 0 omits it (default: 600)
//! - `TILES_URL_BASE` - Base URL used in TileJSON tile templates
//! - `CORS_ORIGINS` - Comma-separated allowed origins (default: any)

use clap::{ArgAction, Parser};

use crate::archive::ArchiveCache;
use crate::coord::MetatileGeometry;
use crate::error::GeometryError;
use crate::server::{CacheControl, RouterConfig};
use crate::store::{KeyFormat, KeyLayout};
use crate::tile::{TileCache, DEFAULT_TILE_CACHE_CAPACITY};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default metatile edge length in base tiles.
pub const DEFAULT_METATILE_SIZE: u32 = 4;

/// Default number of metatiles to cache.
pub const DEFAULT_METATILE_CACHE_ENTRIES: u64 = 32;

/// Default HTTP cache max-age in seconds (20 minutes).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 1200;

/// Default shared cache max-age in seconds (10 minutes).
pub const DEFAULT_SHARED_CACHE_MAX_AGE: u32 = 600;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Metatile Server - Vector tiles served out of zipped metatiles.
///
/// Fetches metatiles from S3 or S3-compatible storage, extracts the requested
/// tile and serves it with HTTP caching headers.
#[derive(Parser, Debug, Clone)]
#[command(name = "metatile-server")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "PORT")]
    pub port: u16,

    // =========================================================================
    // S3 Configuration
    // =========================================================================
    /// S3 bucket name containing the metatiles.
    #[arg(long, env = "S3_BUCKET")]
    pub s3_bucket: String,

    /// Key prefix in front of every metatile key.
    #[arg(long, env = "S3_PREFIX")]
    pub s3_prefix: Option<String>,

    /// Layer name included in metatile keys.
    #[arg(long, env = "S3_LAYER")]
    pub s3_layer: Option<String>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    ///
    /// If not specified, uses the default AWS S3 endpoint.
    #[arg(long, env = "S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "S3_REGION")]
    pub s3_region: String,

    /// Send `RequestPayer=requester` with every read.
    #[arg(long, default_value_t = false, env = "REQUESTER_PAYS")]
    pub requester_pays: bool,

    // =========================================================================
    // Key Layout
    // =========================================================================
    /// Metatile key layout: no-hash, hash-prefix or prefix-hash.
    ///
    /// Takes precedence over --include-hash.
    #[arg(long, env = "KEY_FORMAT_TYPE")]
    pub key_format_type: Option<KeyFormat>,

    /// Include the hash in keys. `false` selects the no-hash layout.
    #[arg(long, default_value_t = true, env = "INCLUDE_HASH", action = ArgAction::Set)]
    pub include_hash: bool,

    // =========================================================================
    // Metatile Geometry
    // =========================================================================
    /// Metatile edge length in 256px tiles (power of two).
    #[arg(long, default_value_t = DEFAULT_METATILE_SIZE, env = "METATILE_SIZE")]
    pub metatile_size: u32,

    /// Zoom past which larger tiles are served from shallower metatiles.
    #[arg(long, env = "METATILE_MAX_DETAIL_ZOOM")]
    pub metatile_max_detail_zoom: Option<u8>,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Maximum number of metatiles to keep in memory.
    #[arg(long, default_value_t = DEFAULT_METATILE_CACHE_ENTRIES, env = "METATILE_CACHE_ENTRIES")]
    pub metatile_cache_entries: u64,

    /// Size of the extracted tile cache in bytes (0 disables it).
    #[arg(long, default_value_t = DEFAULT_TILE_CACHE_CAPACITY, env = "TILE_CACHE_BYTES")]
    pub tile_cache_bytes: u64,

    // =========================================================================
    // HTTP Configuration
    // =========================================================================
    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// HTTP Cache-Control s-maxage in seconds (0 omits the directive).
    #[arg(long, default_value_t = DEFAULT_SHARED_CACHE_MAX_AGE, env = "SHARED_CACHE_MAX_AGE")]
    pub shared_cache_max_age: u32,

    /// Base URL for tile templates in TileJSON documents.
    #[arg(long, env = "TILES_URL_BASE")]
    pub tiles_url_base: Option<String>,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.s3_bucket.is_empty() {
            return Err("S3 bucket name is required. Set --s3-bucket or S3_BUCKET".to_string());
        }

        self.geometry().map_err(|e| e.to_string())?;

        if self.metatile_cache_entries == 0 {
            return Err("metatile_cache_entries must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Metatile geometry of the deployment.
    pub fn geometry(&self) -> Result<MetatileGeometry, GeometryError> {
        MetatileGeometry::new(self.metatile_size, self.metatile_max_detail_zoom)
    }

    /// Resolve prefix, layer and key format into a key layout.
    pub fn key_layout(&self) -> KeyLayout {
        KeyLayout::new(
            self.s3_prefix.clone(),
            self.s3_layer.clone(),
            KeyFormat::from_settings(self.key_format_type, self.include_hash),
        )
    }

    pub fn cache_control(&self) -> CacheControl {
        let shared = (self.shared_cache_max_age > 0).then_some(self.shared_cache_max_age);
        CacheControl::new(self.cache_max_age, shared)
    }

    pub fn archive_cache(&self) -> ArchiveCache {
        ArchiveCache::new(self.metatile_cache_entries)
    }

    /// Extracted tile cache, or `None` when disabled.
    pub fn tile_cache(&self) -> Option<TileCache> {
        (self.tile_cache_bytes > 0).then(|| TileCache::with_capacity(self.tile_cache_bytes))
    }

    /// Build the HTTP router configuration.
    pub fn router_config(&self) -> RouterConfig {
        let mut router_config = RouterConfig::new()
            .with_cache_control(self.cache_control())
            .with_tracing(!self.no_tracing);

        if let Some(ref base) = self.tiles_url_base {
            router_config = router_config.with_tiles_url_base(base.clone());
        }

        if let Some(ref origins) = self.cors_origins {
            router_config = router_config.with_cors_origins(origins.clone());
        }

        router_config
    }
}

// =============================================================================
// Tests
// =============================================================================
