use thiserror::Error;

use crate::coord::TileCoord;

/// Errors describing a tile request the service cannot answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordError {
    /// Zoom outside `[0, MAX_ZOOM)` or x/y outside `[0, 2^zoom)`
    #[error("Requested tile out of range: {zoom}/{x}/{y}")]
    OutOfRange { zoom: u32, x: u32, y: u32 },

    /// Pixel size is zero or not a multiple of the 256px base tile
    #[error("Invalid tile size. {0} is not a multiple of 256")]
    InvalidPixelSize(u32),

    /// Pixel size is a multiple of 256 but no metatile layout can serve it
    #[error("Unsupported tile size {pixel_size}px for metatiles of size {metatile_size}")]
    UnsupportedTileSize { pixel_size: u32, metatile_size: u32 },

    /// File extension does not name a known tile format
    #[error("Unknown tile format: {0}")]
    UnknownFormat(String),
}

/// Metatile geometry misconfiguration.
///
/// These are configuration defects and are checked once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("Metatile size {0} is not a power of two")]
    MetatileSizeNotPowerOfTwo(u32),

    #[error("Tile size {0} is not a power of two")]
    TileSizeNotPowerOfTwo(u32),

    #[error("Tile size must not be greater than metatile size, but {tile_size} > {metatile_size}")]
    TileLargerThanMetatile { tile_size: u32, metatile_size: u32 },
}

/// Failures reported by an archive store.
///
/// A not-modified answer is not a failure; see [`crate::store::FetchOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No object exists at the key
    #[error("No metatile found at {key}")]
    NotFound { key: String },

    /// Any other upstream failure
    #[error("{code} at {key}")]
    Unknown { code: String, key: String },
}

/// Errors raised while reading a metatile's zip container.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArchiveError {
    /// No member with the requested path
    #[error("Tile not found in metatile: {member}")]
    MemberNotFound { member: String },

    /// Bytes do not form a readable zip container
    #[error("Malformed metatile archive: {reason}")]
    Malformed { reason: String },

    /// Member uses a compression method other than stored or deflate
    #[error("Unsupported compression method: {0}")]
    UnsupportedCompression(u16),

    /// Inflated member does not match its recorded CRC-32
    #[error("Checksum mismatch for member {member}")]
    ChecksumMismatch { member: String },
}

/// Errors at the tile retrieval boundary.
///
/// Every kind stays distinct so the HTTP layer can map each to its own status.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] CoordError),

    #[error("Invalid metatile geometry: {0}")]
    InvalidGeometry(#[from] GeometryError),

    /// The metatile holding the tile does not exist
    #[error("Metatile not found: {key}")]
    ArchiveNotFound { key: String },

    #[error("Metatile fetch problem: {code} at {key}")]
    UnknownStorage { code: String, key: String },

    /// The metatile exists but has no member at the offset path
    #[error("Tile {member} not found in metatile {archive}")]
    MemberNotFound { archive: TileCoord, member: String },

    #[error("Corrupt metatile {archive}: {source}")]
    CorruptArchive {
        archive: TileCoord,
        #[source]
        source: ArchiveError,
    },
}

impl From<StoreError> for TileError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { key } => TileError::ArchiveNotFound { key },
            StoreError::Unknown { code, key } => TileError::UnknownStorage { code, key },
        }
    }
}

impl TileError {
    /// Attach the archive coordinate to an extraction failure.
    pub fn from_archive(archive: TileCoord, err: ArchiveError) -> Self {
        match err {
            ArchiveError::MemberNotFound { member } => TileError::MemberNotFound { archive, member },
            source => TileError::CorruptArchive { archive, source },
        }
    }
}
