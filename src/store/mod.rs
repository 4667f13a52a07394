//! Metatile storage.
//!
//! Metatiles live in an object store under keys built by [`build_key`]. The
//! [`ArchiveStore`] trait performs one conditional read per call; the S3
//! implementation is [`S3ArchiveStore`].

mod key;
mod s3_store;

use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StoreError;

pub use key::{build_key, KeyFormat, KeyLayout};
pub use s3_store::{create_s3_client, S3ArchiveStore};

/// Cache-freshness tokens for conditional requests and responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CacheValidators {
    pub last_modified: Option<SystemTime>,
    pub etag: Option<String>,
}

impl CacheValidators {
    pub fn new(last_modified: Option<SystemTime>, etag: Option<String>) -> Self {
        Self {
            last_modified,
            etag,
        }
    }

    /// True when neither validator is present.
    pub fn is_empty(&self) -> bool {
        self.last_modified.is_none() && self.etag.is_none()
    }
}

/// Bytes of a metatile or an extracted tile, with the metatile's validators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub data: Bytes,
    pub validators: CacheValidators,
}

impl StoredBlob {
    pub fn new(data: impl Into<Bytes>, validators: CacheValidators) -> Self {
        Self {
            data: data.into(),
            validators,
        }
    }
}

/// Result of a conditional fetch that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The object was read
    Fetched(StoredBlob),

    /// The object still matches the validators sent with the request
    NotModified,
}

/// Source of metatile objects.
///
/// Implementations issue a single read per call and do not retry.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Fetch the object at `key`.
    ///
    /// Validators that are present are sent as `If-Modified-Since` and
    /// `If-None-Match`. `requester_pays` asks the store to bill the reader.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no object exists at the key
    /// - `Unknown` for any other upstream failure
    async fn fetch(
        &self,
        key: &str,
        validators: &CacheValidators,
        requester_pays: bool,
    ) -> Result<FetchOutcome, StoreError>;

    /// Identifier of the backing location for logs (e.g. `s3://bucket`).
    fn identifier(&self) -> &str;
}

/// Strip the surrounding quotes some stores put around entity tags.
pub fn unquote_etag(etag: &str) -> &str {
    etag.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(etag)
}
