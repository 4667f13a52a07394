//! Tile coordinates and metatile addressing.
//!
//! A tile request names a leaf tile by `zoom/x/y.format`. Tiles are stored in
//! zipped metatiles, each covering a square block of the quadtree. This module
//! holds the value types for both, and [`MetatileGeometry::resolve`] which maps
//! a request onto the metatile that contains it and the tile's offset inside.
//!
//! ```text
//!   request 12/637/935 (256px), metatile size 8
//!
//!   ┌───────────────────────────┐
//!   │ metatile 9/79/116.zip     │
//!   │  ├─ 0/0/0.mvt             │
//!   │  ├─ 1/.../...             │
//!   │  ├─ 2/.../...             │
//!   │  └─ 3/5/7.mvt   ◄──────── offset (Δz=3, 5, 7)
//!   └───────────────────────────┘
//! ```

mod metatile;

use std::fmt;
use std::str::FromStr;

use crate::error::CoordError;

pub use metatile::{is_power_of_two, resolve, size_to_zoom, MetatileGeometry};

/// Requests must have a zoom strictly below this.
pub const MAX_ZOOM: u32 = 17;

/// Edge length of the base tile in pixels.
pub const BASE_TILE_PIXELS: u32 = 256;

// =============================================================================
// Tile Format
// =============================================================================

/// Encoding of a tile, named by its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileFormat {
    /// GeoJSON (`json`)
    Json,
    /// Mapbox Vector Tile (`mvt`)
    Mvt,
    /// Mapbox Vector Tile, binary variant (`mvtb`)
    MvtBinary,
    /// TopoJSON (`topojson`)
    TopoJson,
    /// A metatile archive itself (`zip`)
    Zip,
}

impl TileFormat {
    /// File extension used in URLs, storage keys and member paths.
    pub fn extension(self) -> &'static str {
        match self {
            TileFormat::Json => "json",
            TileFormat::Mvt => "mvt",
            TileFormat::MvtBinary => "mvtb",
            TileFormat::TopoJson => "topojson",
            TileFormat::Zip => "zip",
        }
    }

    /// MIME type sent as `Content-Type`.
    pub fn mime_type(self) -> &'static str {
        match self {
            TileFormat::Json | TileFormat::TopoJson => "application/json",
            TileFormat::Mvt | TileFormat::MvtBinary => "application/x-protobuf",
            TileFormat::Zip => "application/zip",
        }
    }

    /// Whether the format names a leaf tile rather than a metatile.
    pub fn is_tile(self) -> bool {
        !matches!(self, TileFormat::Zip)
    }
}

impl FromStr for TileFormat {
    type Err = CoordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(TileFormat::Json),
            "mvt" => Ok(TileFormat::Mvt),
            "mvtb" => Ok(TileFormat::MvtBinary),
            "topojson" => Ok(TileFormat::TopoJson),
            "zip" => Ok(TileFormat::Zip),
            other => Err(CoordError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

// =============================================================================
// Tile Coordinate
// =============================================================================

/// A tile in the global quadtree, or the root of a metatile.
///
/// Displays as `{zoom}/{x}/{y}.{ext}`, the canonical path used in storage keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
    pub format: TileFormat,
}

impl TileCoord {
    /// Create a coordinate without range checks.
    pub fn new(zoom: u8, x: u32, y: u32, format: TileFormat) -> Self {
        Self { zoom, x, y, format }
    }

    /// Create the root coordinate of a metatile.
    pub fn archive(zoom: u8, x: u32, y: u32) -> Self {
        Self::new(zoom, x, y, TileFormat::Zip)
    }

    /// Create a leaf tile coordinate, rejecting anything outside the quadtree.
    pub fn leaf(zoom: u32, x: u32, y: u32, format: TileFormat) -> Result<Self, CoordError> {
        if !is_valid_tile_request(zoom, x, y) {
            return Err(CoordError::OutOfRange { zoom, x, y });
        }
        // MAX_ZOOM fits in a u8, so the range check above bounds the cast.
        Ok(Self::new(zoom as u8, x, y, format))
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}.{}", self.zoom, self.x, self.y, self.format)
    }
}

// =============================================================================
// Offset Coordinate
// =============================================================================

/// Position of a tile relative to the root of its metatile.
///
/// `delta_zoom` counts levels below the metatile root; `x` and `y` are in
/// `[0, 2^delta_zoom)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OffsetCoord {
    pub delta_zoom: u8,
    pub x: u32,
    pub y: u32,
    pub format: TileFormat,
}

impl OffsetCoord {
    pub fn new(delta_zoom: u8, x: u32, y: u32, format: TileFormat) -> Self {
        Self {
            delta_zoom,
            x,
            y,
            format,
        }
    }

    /// Path of this tile's member inside the metatile zip.
    pub fn member_path(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for OffsetCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}.{}",
            self.delta_zoom, self.x, self.y, self.format
        )
    }
}

/// Check that a tile lies inside the servable quadtree.
///
/// Zoom must be in `[0, MAX_ZOOM)` and both x and y in `[0, 2^zoom)`.
pub fn is_valid_tile_request(zoom: u32, x: u32, y: u32) -> bool {
    if zoom >= MAX_ZOOM {
        return false;
    }
    let extent = 1u64 << zoom;
    u64::from(x) < extent && u64::from(y) < extent
}

// =============================================================================
// Tests
// =============================================================================
