//! Zip container reading for metatiles.
//!
//! Metatiles are plain zip files written by the tile renderer. Only the parts
//! of the format the renderer emits are supported: a single-disk archive with
//! members either stored or deflated, no encryption and no zip64 records.
//!
//! # Layout
//!
//! ```text
//! [local header 1][data 1] ... [local header N][data N]
//! [central directory entry 1] ... [central directory entry N]
//! [end of central directory record][comment]
//! ```
//!
//! The end record is located by scanning backwards from the end of the file,
//! then every central directory entry is indexed by member path. Member data
//! is only inflated when a tile is extracted.

use std::collections::HashMap;
use std::io::Read;

use bytes::Bytes;
use flate2::read::DeflateDecoder;
use flate2::Crc;

use crate::error::ArchiveError;

// =============================================================================
// Constants
// =============================================================================

/// Signature of the end of central directory record ("PK\x05\x06")
const EOCD_SIGNATURE: u32 = 0x0605_4b50;

/// Signature of a central directory file header ("PK\x01\x02")
const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;

/// Signature of a local file header ("PK\x03\x04")
const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;

/// Fixed size of the end of central directory record
const EOCD_SIZE: usize = 22;

/// Largest comment allowed after the end record
const MAX_COMMENT_SIZE: usize = u16::MAX as usize;

/// Fixed size of a central directory file header
const CENTRAL_HEADER_SIZE: usize = 46;

/// Fixed size of a local file header
const LOCAL_HEADER_SIZE: usize = 30;

/// Upper bound on up-front allocation when inflating a member
const MAX_PREALLOCATION: usize = 1024 * 1024;

/// General purpose flag bit set on encrypted members
const FLAG_ENCRYPTED: u16 = 0x0001;

/// Compression method: no compression
pub const METHOD_STORED: u16 = 0;

/// Compression method: raw deflate
pub const METHOD_DEFLATED: u16 = 8;

// =============================================================================
// Byte helpers
// =============================================================================

#[inline]
fn read_u16_le(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

#[inline]
fn read_u32_le(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Borrow `len` bytes at `offset`, failing if the range runs past the end.
fn slice_at<'a>(
    data: &'a [u8],
    offset: usize,
    len: usize,
    what: &str,
) -> Result<&'a [u8], ArchiveError> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or_else(|| malformed(format!("{} at offset {} runs past end of archive", what, offset)))
}

fn malformed(reason: impl Into<String>) -> ArchiveError {
    ArchiveError::Malformed {
        reason: reason.into(),
    }
}

// =============================================================================
// Entries
// =============================================================================

/// Central directory information for one member.
#[derive(Debug, Clone, Copy)]
struct ZipEntry {
    method: u16,
    crc32: u32,
    compressed_size: usize,
    uncompressed_size: usize,
    local_header_offset: usize,
}

// =============================================================================
// MetatileArchive
// =============================================================================

/// An opened metatile with its member index.
///
/// Opening parses the central directory once. Extraction borrows the archive
/// immutably, so an archive can be shared between concurrent requests.
#[derive(Debug, Clone)]
pub struct MetatileArchive {
    data: Bytes,
    entries: HashMap<String, ZipEntry>,
}

impl MetatileArchive {
    /// Parse the central directory of a zip held in memory.
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if the end record or any directory entry cannot be
    /// read, or the archive uses zip64 or encryption.
    pub fn open(data: impl Into<Bytes>) -> Result<Self, ArchiveError> {
        let data = data.into();
        let eocd = find_eocd(&data)?;

        let disk_entries = read_u16_le(&data, eocd + 8);
        let total_entries = read_u16_le(&data, eocd + 10);
        let directory_size = read_u32_le(&data, eocd + 12);
        let directory_offset = read_u32_le(&data, eocd + 16);

        if total_entries == u16::MAX || directory_offset == u32::MAX {
            return Err(malformed("zip64 archives are not supported"));
        }
        if disk_entries != total_entries {
            return Err(malformed("multi-disk archives are not supported"));
        }

        let directory = slice_at(
            &data,
            directory_offset as usize,
            directory_size as usize,
            "central directory",
        )?;

        let mut entries = HashMap::with_capacity(total_entries as usize);
        let mut pos = 0usize;

        for _ in 0..total_entries {
            let header = slice_at(directory, pos, CENTRAL_HEADER_SIZE, "central directory entry")?;
            if read_u32_le(header, 0) != CENTRAL_HEADER_SIGNATURE {
                return Err(malformed(format!(
                    "bad central directory signature at offset {}",
                    directory_offset as usize + pos
                )));
            }

            let flags = read_u16_le(header, 8);
            let method = read_u16_le(header, 10);
            let crc32 = read_u32_le(header, 16);
            let compressed_size = read_u32_le(header, 20);
            let uncompressed_size = read_u32_le(header, 24);
            let name_len = read_u16_le(header, 28) as usize;
            let extra_len = read_u16_le(header, 30) as usize;
            let comment_len = read_u16_le(header, 32) as usize;
            let local_header_offset = read_u32_le(header, 42);

            let name = slice_at(directory, pos + CENTRAL_HEADER_SIZE, name_len, "member name")?;
            let name = String::from_utf8_lossy(name).into_owned();

            if flags & FLAG_ENCRYPTED != 0 {
                return Err(malformed(format!("member {} is encrypted", name)));
            }
            if compressed_size == u32::MAX
                || uncompressed_size == u32::MAX
                || local_header_offset == u32::MAX
            {
                return Err(malformed("zip64 archives are not supported"));
            }

            pos += CENTRAL_HEADER_SIZE + name_len + extra_len + comment_len;

            // Directory markers carry no data
            if name.ends_with('/') {
                continue;
            }

            entries.insert(
                name,
                ZipEntry {
                    method,
                    crc32,
                    compressed_size: compressed_size as usize,
                    uncompressed_size: uncompressed_size as usize,
                    local_header_offset: local_header_offset as usize,
                },
            );
        }

        Ok(Self { data, entries })
    }

    /// Number of file members in the archive.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, member: &str) -> bool {
        self.entries.contains_key(member)
    }

    /// Member paths, in no particular order.
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Read one member's bytes.
    ///
    /// The returned bytes never share storage with the archive, so holding a
    /// tile does not keep its whole metatile alive.
    ///
    /// # Errors
    ///
    /// - `MemberNotFound` if no member has this path
    /// - `UnsupportedCompression` for methods other than stored and deflate
    /// - `ChecksumMismatch` if the data does not match the recorded CRC-32
    /// - `Malformed` if the local header or data cannot be read
    pub fn extract(&self, member: &str) -> Result<Bytes, ArchiveError> {
        let entry = self
            .entries
            .get(member)
            .ok_or_else(|| ArchiveError::MemberNotFound {
                member: member.to_string(),
            })?;

        let header = slice_at(&self.data, entry.local_header_offset, LOCAL_HEADER_SIZE, "local header")?;
        if read_u32_le(header, 0) != LOCAL_HEADER_SIGNATURE {
            return Err(malformed(format!("bad local header signature for {}", member)));
        }

        // Local extra fields may differ from the central copy
        let name_len = read_u16_le(header, 26) as usize;
        let extra_len = read_u16_le(header, 28) as usize;
        let data_offset = entry.local_header_offset + LOCAL_HEADER_SIZE + name_len + extra_len;
        let compressed = slice_at(&self.data, data_offset, entry.compressed_size, "member data")?;

        let contents = match entry.method {
            METHOD_STORED => Bytes::copy_from_slice(compressed),
            METHOD_DEFLATED => {
                // One byte past the recorded size is enough to detect overrun
                let limit = entry.uncompressed_size as u64 + 1;
                let mut out = Vec::with_capacity(entry.uncompressed_size.min(MAX_PREALLOCATION));
                DeflateDecoder::new(compressed)
                    .take(limit)
                    .read_to_end(&mut out)
                    .map_err(|e| malformed(format!("failed to inflate {}: {}", member, e)))?;
                Bytes::from(out)
            }
            other => return Err(ArchiveError::UnsupportedCompression(other)),
        };

        if contents.len() != entry.uncompressed_size {
            return Err(malformed(format!(
                "member {} is {} bytes, directory says {}",
                member,
                contents.len(),
                entry.uncompressed_size
            )));
        }

        let mut crc = Crc::new();
        crc.update(&contents);
        if crc.sum() != entry.crc32 {
            return Err(ArchiveError::ChecksumMismatch {
                member: member.to_string(),
            });
        }

        Ok(contents)
    }
}

/// Locate the end of central directory record.
///
/// The record is at least 22 bytes from the end, preceded by up to 64 KiB of
/// comment, so the search window is bounded.
fn find_eocd(data: &[u8]) -> Result<usize, ArchiveError> {
    if data.len() < EOCD_SIZE {
        return Err(malformed(format!(
            "{} bytes is too short to be a zip archive",
            data.len()
        )));
    }

    let last = data.len() - EOCD_SIZE;
    let first = last.saturating_sub(MAX_COMMENT_SIZE);

    (first..=last)
        .rev()
        .find(|&pos| {
            read_u32_le(data, pos) == EOCD_SIGNATURE
                && pos + EOCD_SIZE + read_u16_le(data, pos + 20) as usize == data.len()
        })
        .ok_or_else(|| malformed("end of central directory not found"))
}

// =============================================================================
// Tests
// =============================================================================
