//! Tile service layer.
//!
//! This module turns tile requests into tile bytes, sitting between the HTTP
//! layer and metatile storage:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │ ArchiveCache │  │   TileCache     │  │
//! │  │ (metatiles)  │  │  (extracted     │  │
//! │  │              │  │   tiles)        │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              ArchiveStore               │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileService`]: Main entry point for tile requests, orchestrates the full pipeline
//! - [`TileCache`]: Size-bounded cache of extracted tiles
//! - [`TileCacheKey`]: Composite key for extracted tiles (metatile, offset, ETag)
//! - [`TileRequest`]: Parameters for a tile request
//! - [`TileOutcome`]: A tile or a not-modified answer

mod cache;
mod service;

pub use cache::{TileCache, TileCacheKey, DEFAULT_TILE_CACHE_CAPACITY};
pub use service::{CacheStats, TileOutcome, TileRequest, TileResponse, TileService};
