//! Metatile archives.
//!
//! - [`MetatileArchive`] indexes a zipped metatile and extracts single tiles
//! - [`ArchiveCache`] keeps recently fetched metatiles in memory

mod cache;
mod zip;

pub use cache::ArchiveCache;
pub use zip::{MetatileArchive, METHOD_DEFLATED, METHOD_STORED};
