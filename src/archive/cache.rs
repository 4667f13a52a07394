//! In-memory cache of fetched metatiles.
//!
//! Metatiles are keyed by their root coordinate and stored together with the
//! validators they were fetched with. The cache is bounded by entry count and
//! built on `moka::future::Cache`, whose TinyLFU admission policy keeps
//! frequently requested metatiles over ones that were merely touched recently.
//! Popular areas of the map stay resident while one-off requests churn through.
//!
//! Only successful fetches are stored. Missing metatiles are never cached, since
//! a metatile that does not exist yet may be published at any moment.

use moka::future::Cache as MokaCache;

use crate::coord::TileCoord;
use crate::store::StoredBlob;

/// Default number of metatiles kept in memory.
pub const DEFAULT_ARCHIVE_CACHE_ENTRIES: u64 = 32;

/// Bounded cache of metatile bytes keyed by metatile coordinate.
///
/// The cache is thread-safe and can be shared across async tasks via `Arc`.
/// Concurrent misses on the same coordinate may each fetch and insert; the
/// last insert wins.
#[derive(Clone)]
pub struct ArchiveCache {
    cache: MokaCache<TileCoord, StoredBlob>,
    capacity: u64,
}

impl ArchiveCache {
    /// Create a cache holding at most `capacity` metatiles.
    pub fn new(capacity: u64) -> Self {
        Self {
            cache: MokaCache::builder().max_capacity(capacity).build(),
            capacity,
        }
    }

    /// Get a metatile, recording the access for the eviction policy.
    pub async fn get(&self, archive: &TileCoord) -> Option<StoredBlob> {
        self.cache.get(archive).await
    }

    /// Store a metatile, replacing any previous copy.
    pub async fn put(&self, archive: TileCoord, blob: StoredBlob) {
        self.cache.insert(archive, blob).await;
    }

    pub fn contains(&self, archive: &TileCoord) -> bool {
        self.cache.contains_key(archive)
    }

    /// Number of cached metatiles.
    ///
    /// Moka applies inserts and evictions lazily, so this can lag behind
    /// until [`run_pending_tasks`](Self::run_pending_tasks) is called.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Apply pending inserts, evictions and access records.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}

impl Default for ArchiveCache {
    fn default() -> Self {
        Self::new(DEFAULT_ARCHIVE_CACHE_ENTRIES)
    }
}

// =============================================================================
// Tests
// =============================================================================
