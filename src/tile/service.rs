//! Tile Service for serving tiles out of metatiles.
//!
//! The TileService is the main entry point for tile requests. It orchestrates:
//! - Request validation
//! - Metatile addressing
//! - Metatile cache lookups and conditional fetches
//! - Tile extraction and extracted-tile caching
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TileService                             │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                    retrieve()                           │    │
//! │  │  1. Validate request   4. Fetch metatile on miss        │    │
//! │  │  2. Resolve metatile   5. Extract tile                  │    │
//! │  │  3. Check cache        6. Cache & return                │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                    │                    │           │
//! │           ▼                    ▼                    ▼           │
//! │    ┌──────────────┐    ┌──────────────┐    ┌─────────────────┐  │
//! │    │ ArchiveCache │    │ ArchiveStore │    │ MetatileArchive │  │
//! │    └──────────────┘    └──────────────┘    └─────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Cache freshness
//!
//! A metatile in the cache is served without asking the store again, even when
//! the client sent validators. Conditional requests only reach the store on a
//! cache miss, so a client can receive a full response for a tile it already
//! holds, and a metatile replaced upstream is only picked up once its cached
//! copy is evicted.

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::archive::{ArchiveCache, MetatileArchive};
use crate::coord::{MetatileGeometry, OffsetCoord, TileCoord, TileFormat, BASE_TILE_PIXELS};
use crate::error::TileError;
use crate::store::{ArchiveStore, CacheValidators, FetchOutcome, KeyLayout, StoredBlob};

use super::cache::{TileCache, TileCacheKey};

// =============================================================================
// Tile Request
// =============================================================================

/// A request for a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRequest {
    pub zoom: u32,
    pub x: u32,
    pub y: u32,
    pub format: TileFormat,

    /// Edge length of the requested tile in pixels (multiple of 256)
    pub pixel_size: u32,
}

impl TileRequest {
    /// Create a new request for a 256px tile.
    pub fn new(zoom: u32, x: u32, y: u32, format: TileFormat) -> Self {
        Self::with_pixel_size(zoom, x, y, format, BASE_TILE_PIXELS)
    }

    /// Create a new request with an explicit pixel size.
    pub fn with_pixel_size(zoom: u32, x: u32, y: u32, format: TileFormat, pixel_size: u32) -> Self {
        Self {
            zoom,
            x,
            y,
            format,
            pixel_size,
        }
    }
}

// =============================================================================
// Tile Response
// =============================================================================

/// A tile ready to be sent.
#[derive(Debug, Clone)]
pub struct TileResponse {
    /// The tile bytes
    pub data: Bytes,

    /// Validators of the metatile the tile came from
    pub validators: CacheValidators,

    pub format: TileFormat,

    /// Whether the metatile was served from the metatile cache
    pub archive_cache_hit: bool,
}

/// Outcome of a retrieval that did not fail.
#[derive(Debug, Clone)]
pub enum TileOutcome {
    Tile(TileResponse),

    /// The store confirmed the client's copy is current
    NotModified,
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub archive_entries: u64,
    pub archive_capacity: u64,
    pub tile_entries: u64,
    pub tile_bytes: u64,
}

// =============================================================================
// Tile Service
// =============================================================================

/// Service for locating, fetching and extracting tiles.
///
/// # Type Parameters
///
/// * `S` - The archive store (e.g. [`crate::store::S3ArchiveStore`])
///
/// # Example
///
/// ```ignore
/// use metatile_server::coord::{MetatileGeometry, TileFormat};
/// use metatile_server::store::{KeyFormat, KeyLayout};
/// use metatile_server::tile::{TileRequest, TileService};
///
/// let geometry = MetatileGeometry::new(4, None)?;
/// let layout = KeyLayout::new(None, Some("all".into()), KeyFormat::PrefixHash);
/// let service = TileService::new(store, geometry, layout);
///
/// let request = TileRequest::new(12, 637, 935, TileFormat::Mvt);
/// let outcome = service.retrieve(&request, &CacheValidators::default()).await?;
/// ```
pub struct TileService<S: ArchiveStore> {
    store: Arc<S>,
    geometry: MetatileGeometry,
    layout: KeyLayout,
    requester_pays: bool,
    archives: ArchiveCache,

    /// `None` disables extracted-tile caching
    tiles: Option<TileCache>,
}

impl<S: ArchiveStore> TileService<S> {
    /// Create a new tile service with default cache settings.
    pub fn new(store: S, geometry: MetatileGeometry, layout: KeyLayout) -> Self {
        Self::with_shared_store(Arc::new(store), geometry, layout)
    }

    /// Create a new tile service with a shared store.
    pub fn with_shared_store(store: Arc<S>, geometry: MetatileGeometry, layout: KeyLayout) -> Self {
        Self {
            store,
            geometry,
            layout,
            requester_pays: false,
            archives: ArchiveCache::default(),
            tiles: Some(TileCache::new()),
        }
    }

    /// Bill metatile reads to this service's account.
    pub fn with_requester_pays(mut self, requester_pays: bool) -> Self {
        self.requester_pays = requester_pays;
        self
    }

    pub fn with_archive_cache(mut self, archives: ArchiveCache) -> Self {
        self.archives = archives;
        self
    }

    /// Replace the extracted-tile cache; `None` disables it.
    pub fn with_tile_cache(mut self, tiles: Option<TileCache>) -> Self {
        self.tiles = tiles;
        self
    }

    pub fn geometry(&self) -> &MetatileGeometry {
        &self.geometry
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Retrieve one tile.
    ///
    /// `validators` are the client's conditional headers. They are forwarded
    /// to the store only when the metatile is not cached.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if the tile is outside the quadtree or the pixel size
    ///   cannot be served
    /// - `ArchiveNotFound` if the metatile does not exist
    /// - `MemberNotFound` if the metatile exists without this tile
    /// - `UnknownStorage` for other store failures
    /// - `CorruptArchive` if the metatile cannot be read
    pub async fn retrieve(
        &self,
        request: &TileRequest,
        validators: &CacheValidators,
    ) -> Result<TileOutcome, TileError> {
        let requested = TileCoord::leaf(request.zoom, request.x, request.y, request.format)?;
        let tile_size = self.geometry.tile_size_for_pixels(request.pixel_size)?;
        let (archive, offset) = self.geometry.resolve(&requested, tile_size)?;

        let (blob, archive_cache_hit) = match self.archives.get(&archive).await {
            Some(blob) => {
                debug!(archive = %archive, "Metatile cache hit");
                (blob, true)
            }
            None => match self.fetch_archive(&archive, validators).await? {
                Some(blob) => (blob, false),
                None => return Ok(TileOutcome::NotModified),
            },
        };

        let data = self.extract_tile(&archive, &offset, &blob).await?;

        Ok(TileOutcome::Tile(TileResponse {
            data,
            validators: blob.validators,
            format: request.format,
            archive_cache_hit,
        }))
    }

    /// Fetch a metatile from the store and cache it.
    ///
    /// Returns `None` when the store answers not-modified; the cache is left
    /// untouched in that case.
    async fn fetch_archive(
        &self,
        archive: &TileCoord,
        validators: &CacheValidators,
    ) -> Result<Option<StoredBlob>, TileError> {
        let key = self.layout.key_for(archive);

        match self.store.fetch(&key, validators, self.requester_pays).await? {
            FetchOutcome::Fetched(blob) => {
                self.archives.put(*archive, blob.clone()).await;
                Ok(Some(blob))
            }
            FetchOutcome::NotModified => Ok(None),
        }
    }

    /// Pull the tile at `offset` out of a metatile, going through the tile cache.
    async fn extract_tile(
        &self,
        archive: &TileCoord,
        offset: &OffsetCoord,
        blob: &StoredBlob,
    ) -> Result<Bytes, TileError> {
        let cache_key = TileCacheKey::new(*archive, *offset, blob.validators.etag.clone());

        if let Some(tiles) = &self.tiles {
            if let Some(data) = tiles.get(&cache_key).await {
                debug!(archive = %archive, offset = %offset, "Tile cache hit");
                return Ok(data);
            }
        }

        let data = MetatileArchive::open(blob.data.clone())
            .and_then(|zip| zip.extract(&offset.member_path()))
            .map_err(|e| TileError::from_archive(*archive, e))?;

        if let Some(tiles) = &self.tiles {
            tiles.put(cache_key, data.clone()).await;
        }

        Ok(data)
    }

    /// Get cache statistics.
    ///
    /// Counts are approximate until pending cache maintenance has run.
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            archive_entries: self.archives.entry_count(),
            archive_capacity: self.archives.capacity(),
            tile_entries: self.tiles.as_ref().map_or(0, |t| t.len()),
            tile_bytes: self.tiles.as_ref().map_or(0, |t| t.size()),
        }
    }

    /// Apply pending maintenance on both caches.
    pub async fn sync_caches(&self) {
        self.archives.run_pending_tasks().await;
        if let Some(tiles) = &self.tiles {
            tiles.run_pending_tasks().await;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
