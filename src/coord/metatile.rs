//! Mapping tile requests onto metatiles.
//!
//! Sizes are expressed as multiples of the 256px base tile: a metatile of size 4
//! holds a 4x4 block of base tiles (plus the coarser levels above them), and a
//! requested tile size of 2 means a 512px tile. Both must be powers of two, so
//! each size corresponds to a whole number of quadtree levels.

use crate::error::{CoordError, GeometryError};

use super::{OffsetCoord, TileCoord, BASE_TILE_PIXELS};

/// Check whether `n` is a positive power of two.
#[inline]
pub fn is_power_of_two(n: u32) -> bool {
    n.is_power_of_two()
}

/// Number of quadtree levels spanned by a power-of-two size.
#[inline]
pub fn size_to_zoom(size: u32) -> u8 {
    size.trailing_zeros() as u8
}

/// Resolve a requested tile to its metatile and the offset inside it.
///
/// `metatile_size` and `tile_size` are in base-tile units and must be powers
/// of two with `tile_size <= metatile_size`.
///
/// When `max_detail_zoom` is set and the request asks for detail beyond it, the
/// offset is widened so the tile comes from a metatile at or near that zoom. The
/// widening is capped at the metatile's own depth: past that point the lookup is
/// meant to miss the metatile entirely rather than open one that lacks the tile.
///
/// # Errors
///
/// Returns a [`GeometryError`] if either size is not a power of two, or the tile
/// is larger than the metatile.
pub fn resolve(
    requested: &TileCoord,
    metatile_size: u32,
    tile_size: u32,
    max_detail_zoom: Option<u8>,
) -> Result<(TileCoord, OffsetCoord), GeometryError> {
    check_sizes(metatile_size, tile_size)?;

    let meta_zoom = size_to_zoom(metatile_size);
    let tile_zoom = size_to_zoom(tile_size);
    let mut delta_z = meta_zoom - tile_zoom;

    // No negative zooms: below delta_z the metatile clamps to the world root.
    let archive = if requested.zoom < delta_z {
        TileCoord::archive(0, 0, 0)
    } else {
        // Zero leaves the clamp off, like an unset value.
        if let Some(max_detail) = max_detail_zoom.filter(|&z| z > 0) {
            if requested.zoom - delta_z > max_detail {
                delta_z = (requested.zoom - max_detail).min(meta_zoom);
            }
        }

        TileCoord::archive(
            requested.zoom - delta_z,
            requested.x >> delta_z,
            requested.y >> delta_z,
        )
    };

    let actual_delta_z = requested.zoom - archive.zoom;
    let offset = OffsetCoord::new(
        actual_delta_z,
        requested.x - (archive.x << actual_delta_z),
        requested.y - (archive.y << actual_delta_z),
        requested.format,
    );

    Ok((archive, offset))
}

fn check_sizes(metatile_size: u32, tile_size: u32) -> Result<(), GeometryError> {
    if !is_power_of_two(metatile_size) {
        return Err(GeometryError::MetatileSizeNotPowerOfTwo(metatile_size));
    }
    if !is_power_of_two(tile_size) {
        return Err(GeometryError::TileSizeNotPowerOfTwo(tile_size));
    }
    if tile_size > metatile_size {
        return Err(GeometryError::TileLargerThanMetatile {
            tile_size,
            metatile_size,
        });
    }
    Ok(())
}

// =============================================================================
// Metatile Geometry
// =============================================================================

/// Metatile layout of a deployment.
///
/// Validated once when the service starts; per-request tile sizes are checked
/// against it with [`MetatileGeometry::tile_size_for_pixels`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetatileGeometry {
    metatile_size: u32,
    max_detail_zoom: Option<u8>,
}

impl MetatileGeometry {
    /// Create a geometry, rejecting metatile sizes that are not powers of two.
    pub fn new(metatile_size: u32, max_detail_zoom: Option<u8>) -> Result<Self, GeometryError> {
        if !is_power_of_two(metatile_size) {
            return Err(GeometryError::MetatileSizeNotPowerOfTwo(metatile_size));
        }
        Ok(Self {
            metatile_size,
            max_detail_zoom,
        })
    }

    pub fn metatile_size(&self) -> u32 {
        self.metatile_size
    }

    pub fn max_detail_zoom(&self) -> Option<u8> {
        self.max_detail_zoom
    }

    /// Number of zoom levels below a metatile's root that it stores.
    pub fn metatile_zoom(&self) -> u8 {
        size_to_zoom(self.metatile_size)
    }

    /// Convert a requested pixel size into a tile size in base-tile units.
    ///
    /// # Errors
    ///
    /// - `InvalidPixelSize` if the size is zero or not a multiple of 256
    /// - `UnsupportedTileSize` if the result is not a power of two or exceeds
    ///   the metatile size
    pub fn tile_size_for_pixels(&self, pixel_size: u32) -> Result<u32, CoordError> {
        if pixel_size == 0 || pixel_size % BASE_TILE_PIXELS != 0 {
            return Err(CoordError::InvalidPixelSize(pixel_size));
        }

        let tile_size = pixel_size / BASE_TILE_PIXELS;
        if !is_power_of_two(tile_size) || tile_size > self.metatile_size {
            return Err(CoordError::UnsupportedTileSize {
                pixel_size,
                metatile_size: self.metatile_size,
            });
        }

        Ok(tile_size)
    }

    /// Resolve a request of the given tile size within this geometry.
    pub fn resolve(
        &self,
        requested: &TileCoord,
        tile_size: u32,
    ) -> Result<(TileCoord, OffsetCoord), GeometryError> {
        resolve(
            requested,
            self.metatile_size,
            tile_size,
            self.max_detail_zoom,
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
