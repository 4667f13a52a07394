//! Test utilities for integration tests.
//!
//! This module provides a mock archive store and helpers for building
//! metatile zip archives in memory.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use flate2::write::{DeflateEncoder, GzDecoder};
use flate2::{Compression, Crc};

use metatile_server::coord::{MetatileGeometry, TileCoord};
use metatile_server::error::StoreError;
use metatile_server::store::{
    ArchiveStore, CacheValidators, FetchOutcome, KeyFormat, KeyLayout, StoredBlob,
};
use metatile_server::tile::TileService;

/// ETag every fixture metatile carries.
pub const FIXTURE_ETAG: &str = "abc";

/// Last-Modified of every fixture metatile, `Fri, 14 Jul 2017 02:40:00 GMT`.
pub const FIXTURE_LAST_MODIFIED: &str = "Fri, 14 Jul 2017 02:40:00 GMT";

/// Prefix used by the fixture key layout.
pub const FIXTURE_PREFIX: &str = "20240101";

// =============================================================================
// Mock Archive Store with Request Tracking
// =============================================================================

/// A mock archive store that serves pre-configured metatiles and tracks every
/// fetch.
///
/// Clones share their tracking state, so a test can hand one clone to the
/// service and inspect the other.
#[derive(Clone)]
pub struct MockArchiveStore {
    objects: Arc<HashMap<String, StoredBlob>>,
    fetch_count: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<(String, CacheValidators, bool)>>>,
    not_modified: bool,
    failure: Option<StoreError>,
}

impl MockArchiveStore {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(HashMap::new()),
            fetch_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            not_modified: false,
            failure: None,
        }
    }

    /// Store a metatile under the key the layout assigns it.
    pub fn with_archive(self, layout: &KeyLayout, archive: TileCoord, blob: StoredBlob) -> Self {
        let key = layout.key_for(&archive);
        self.with_object(key, blob)
    }

    pub fn with_object(mut self, key: impl Into<String>, blob: StoredBlob) -> Self {
        Arc::make_mut(&mut self.objects).insert(key.into(), blob);
        self
    }

    /// Answer not-modified whenever the request carries validators.
    pub fn with_not_modified(mut self) -> Self {
        self.not_modified = true;
        self
    }

    /// Fail every fetch with the given error.
    pub fn with_failure(mut self, failure: StoreError) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Keys fetched so far, in order.
    pub fn requested_keys(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(key, _, _)| key.clone())
            .collect()
    }

    /// Validators sent with each fetch, in order.
    pub fn requested_validators(&self) -> Vec<CacheValidators> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, validators, _)| validators.clone())
            .collect()
    }

    /// Requester-pays flag sent with each fetch, in order.
    pub fn requester_pays_flags(&self) -> Vec<bool> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, requester_pays)| *requester_pays)
            .collect()
    }
}

impl Default for MockArchiveStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArchiveStore for MockArchiveStore {
    async fn fetch(
        &self,
        key: &str,
        validators: &CacheValidators,
        requester_pays: bool,
    ) -> Result<FetchOutcome, StoreError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap()
            .push((key.to_string(), validators.clone(), requester_pays));

        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        if self.not_modified && !validators.is_empty() {
            return Ok(FetchOutcome::NotModified);
        }

        self.objects
            .get(key)
            .cloned()
            .map(FetchOutcome::Fetched)
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    fn identifier(&self) -> &str {
        "mock://metatiles"
    }
}

// =============================================================================
// Zip Builder
// =============================================================================

/// Compression applied to a zip member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Stored,
    Deflated,
}

impl Method {
    fn code(self) -> u16 {
        match self {
            Method::Stored => 0,
            Method::Deflated => 8,
        }
    }
}

/// One file inside a test zip.
pub struct ZipMember {
    pub name: String,
    pub contents: Vec<u8>,
    pub method: Method,
}

impl ZipMember {
    pub fn stored(name: &str, contents: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            contents: contents.to_vec(),
            method: Method::Stored,
        }
    }

    pub fn deflated(name: &str, contents: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            contents: contents.to_vec(),
            method: Method::Deflated,
        }
    }
}

/// Create a zip archive holding the given members.
///
/// The archive is single-disk with no extra fields and no comment, the way
/// metatile writers produce them.
pub fn create_zip(members: &[ZipMember]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut directory = Vec::new();

    for member in members {
        let contents = &member.contents;
        let method = member.method;

        let mut crc = Crc::new();
        crc.update(contents);
        let crc = crc.sum();

        let data = match method {
            Method::Stored => contents.clone(),
            Method::Deflated => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(contents).unwrap();
                encoder.finish().unwrap()
            }
        };

        let header_offset = out.len() as u32;
        let name = member.name.as_bytes();

        // Local file header
        out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes()); // version needed
        out.extend_from_slice(&0u16.to_le_bytes()); // flags
        out.extend_from_slice(&method.code().to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // mod time
        out.extend_from_slice(&0x21u16.to_le_bytes()); // mod date
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(contents.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // extra length
        out.extend_from_slice(name);
        out.extend_from_slice(&data);

        // Central directory entry
        directory.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
        directory.extend_from_slice(&20u16.to_le_bytes()); // version made by
        directory.extend_from_slice(&20u16.to_le_bytes()); // version needed
        directory.extend_from_slice(&0u16.to_le_bytes());
        directory.extend_from_slice(&method.code().to_le_bytes());
        directory.extend_from_slice(&0u16.to_le_bytes());
        directory.extend_from_slice(&0x21u16.to_le_bytes());
        directory.extend_from_slice(&crc.to_le_bytes());
        directory.extend_from_slice(&(data.len() as u32).to_le_bytes());
        directory.extend_from_slice(&(contents.len() as u32).to_le_bytes());
        directory.extend_from_slice(&(name.len() as u16).to_le_bytes());
        directory.extend_from_slice(&0u16.to_le_bytes()); // extra length
        directory.extend_from_slice(&0u16.to_le_bytes()); // comment length
        directory.extend_from_slice(&0u16.to_le_bytes()); // disk number
        directory.extend_from_slice(&0u16.to_le_bytes()); // internal attributes
        directory.extend_from_slice(&0u32.to_le_bytes()); // external attributes
        directory.extend_from_slice(&header_offset.to_le_bytes());
        directory.extend_from_slice(name);
    }

    let directory_offset = out.len() as u32;
    out.extend_from_slice(&directory);

    // End of central directory
    out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(members.len() as u16).to_le_bytes());
    out.extend_from_slice(&(members.len() as u16).to_le_bytes());
    out.extend_from_slice(&(directory.len() as u32).to_le_bytes());
    out.extend_from_slice(&directory_offset.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());

    out
}

/// Wrap archive bytes with the fixture validators.
pub fn stored_blob(data: Vec<u8>) -> StoredBlob {
    StoredBlob::new(
        data,
        CacheValidators::new(
            Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_500_000_000)),
            Some(FIXTURE_ETAG.to_string()),
        ),
    )
}

/// Decompress a gzip response body.
pub fn gunzip(data: &[u8]) -> Vec<u8> {
    let mut decoder = GzDecoder::new(Vec::new());
    decoder.write_all(data).unwrap();
    decoder.finish().unwrap()
}

// =============================================================================
// Fixture Service
// =============================================================================

/// Key layout used by the fixture store.
pub fn fixture_layout() -> KeyLayout {
    KeyLayout::new(Some(FIXTURE_PREFIX.to_string()), None, KeyFormat::NoHash)
}

/// Metatiles of size 4 with no detail clamp.
pub fn fixture_geometry() -> MetatileGeometry {
    MetatileGeometry::new(4, None).unwrap()
}

/// A store holding two metatiles of size 4:
///
/// - `0/0/0.zip` (world root): `0/0/0.mvt`, `0/0/0.json`, `1/1/0.mvt`, `2/3/2.mvt`
/// - `1/1/1.zip`: `2/1/2.mvt`
pub fn fixture_store() -> MockArchiveStore {
    let layout = fixture_layout();

    let root = create_zip(&[
        ZipMember::deflated("0/0/0.mvt", b"world tile"),
        ZipMember::stored("0/0/0.json", br#"{"type":"FeatureCollection","features":[]}"#),
        ZipMember::stored("1/1/0.mvt", b"zoom one tile"),
        ZipMember::deflated("2/3/2.mvt", b"zoom two tile"),
    ]);
    let child = create_zip(&[ZipMember::deflated("2/1/2.mvt", b"zoom three tile")]);

    MockArchiveStore::new()
        .with_archive(&layout, TileCoord::archive(0, 0, 0), stored_blob(root))
        .with_archive(&layout, TileCoord::archive(1, 1, 1), stored_blob(child))
}

/// A tile service over `store` using the fixture layout and geometry.
pub fn fixture_service(store: MockArchiveStore) -> TileService<MockArchiveStore> {
    TileService::new(store, fixture_geometry(), fixture_layout())
}

/// A tile service sharing `store` so the test can inspect its tracking.
pub fn tracked_service(store: &MockArchiveStore) -> TileService<MockArchiveStore> {
    fixture_service(store.clone())
}
