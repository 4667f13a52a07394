//! Cache for tiles already extracted from metatiles.
//!
//! A metatile is usually queried for many different tiles in a short span, so
//! extracted tiles are kept to avoid re-inflating the same member.
//!
//! # Cache Key
//!
//! Tiles are cached by a composite key including:
//! - Metatile coordinate
//! - Offset of the tile inside the metatile
//! - ETag of the metatile the tile was extracted from
//!
//! The ETag ties a tile to one version of its metatile: once the metatile
//! cache holds a newer copy, lookups use the new ETag and old tiles simply age
//! out.
//!
//! # Size-Based Eviction
//!
//! Entries are weighted by their byte length and the cache evicts once the
//! total weight exceeds capacity, using the same frequency-aware policy as the
//! metatile cache.

use bytes::Bytes;
use moka::future::Cache as MokaCache;

use crate::coord::{OffsetCoord, TileCoord};

/// Default cache capacity: 64MB
pub const DEFAULT_TILE_CACHE_CAPACITY: u64 = 64 * 1024 * 1024;

// =============================================================================
// Cache Key
// =============================================================================

/// Cache key for extracted tiles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileCacheKey {
    /// Root coordinate of the metatile
    pub archive: TileCoord,

    /// Position of the tile inside the metatile
    pub offset: OffsetCoord,

    /// ETag of the metatile version the tile came from
    pub etag: Option<String>,
}

impl TileCacheKey {
    pub fn new(archive: TileCoord, offset: OffsetCoord, etag: Option<String>) -> Self {
        Self {
            archive,
            offset,
            etag,
        }
    }
}

// =============================================================================
// Tile Cache
// =============================================================================

/// Size-bounded cache of extracted tile bytes.
///
/// The cache is thread-safe and can be shared across async tasks via `Arc`.
#[derive(Clone)]
pub struct TileCache {
    cache: MokaCache<TileCacheKey, Bytes>,
    max_size: u64,
}

impl TileCache {
    /// Create a new tile cache with default capacity (64MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Create a new tile cache with the specified capacity in bytes.
    pub fn with_capacity(max_size: u64) -> Self {
        let cache = MokaCache::builder()
            // moka weights are u32, tiles never come close
            .weigher(|_key: &TileCacheKey, value: &Bytes| -> u32 {
                value.len().min(u32::MAX as usize) as u32
            })
            .max_capacity(max_size)
            .build();

        Self { cache, max_size }
    }

    pub async fn get(&self, key: &TileCacheKey) -> Option<Bytes> {
        self.cache.get(key).await
    }

    pub async fn put(&self, key: TileCacheKey, data: Bytes) {
        self.cache.insert(key, data).await;
    }

    pub fn contains(&self, key: &TileCacheKey) -> bool {
        self.cache.contains_key(key)
    }

    /// Number of cached tiles.
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total size of cached tiles in bytes.
    pub fn size(&self) -> u64 {
        self.cache.weighted_size()
    }

    /// Get the maximum capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.max_size
    }

    /// Apply pending inserts, evictions and access records.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
