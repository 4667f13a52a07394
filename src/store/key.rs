//! Object keys for metatiles.
//!
//! Keys carry a short content hash so that objects spread across S3 key-space
//! partitions. Three layouts exist because earlier deployments wrote data under
//! each of them, and all three must stay addressable. For metatile 13/4008/3973
//! in the `all` layer under prefix `abc`:
//!
//! ```text
//! NoHash:     abc/all/13/4008/3973.zip
//! HashPrefix: c1315/abc/all/13/4008/3973.zip
//! PrefixHash: abc/c1315/all/13/4008/3973.zip
//! ```

use std::fmt;
use std::str::FromStr;

use md5::{Digest, Md5};

use crate::coord::TileCoord;

/// Number of hex characters of the hash kept in the key.
const HASH_LENGTH: usize = 5;

/// How the content hash is combined with the key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyFormat {
    /// `{prefix}/{path}`
    NoHash,
    /// `{hash}/{prefix}/{path}`
    HashPrefix,
    /// `{prefix}/{hash}/{path}`
    #[default]
    PrefixHash,
}

impl KeyFormat {
    /// Pick the key format from deployment settings.
    ///
    /// An explicit format wins. Otherwise `include_hash = false` selects
    /// `NoHash`, and everything else gets `PrefixHash`.
    pub fn from_settings(explicit: Option<KeyFormat>, include_hash: bool) -> Self {
        match explicit {
            Some(format) => format,
            None if !include_hash => KeyFormat::NoHash,
            None => KeyFormat::PrefixHash,
        }
    }
}

impl FromStr for KeyFormat {
    type Err = String;

    /// Accepts `no-hash`, `no_hash` and `NO_HASH` style spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "no_hash" => Ok(KeyFormat::NoHash),
            "hash_prefix" => Ok(KeyFormat::HashPrefix),
            "prefix_hash" => Ok(KeyFormat::PrefixHash),
            _ => Err(format!(
                "unknown key format '{}' (expected no-hash, hash-prefix or prefix-hash)",
                s
            )),
        }
    }
}

impl fmt::Display for KeyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyFormat::NoHash => "no-hash",
            KeyFormat::HashPrefix => "hash-prefix",
            KeyFormat::PrefixHash => "prefix-hash",
        };
        f.write_str(name)
    }
}

/// Build the object key for a metatile.
///
/// The hash covers `{z}/{x}/{y}.{ext}`, or `/{layer}/{z}/{x}/{y}.{ext}` when a
/// layer is set. The leading slash in the layered form matches keys written
/// before layers were dropped from hashed paths; the bare form has none.
/// Empty `prefix` and `layer` are treated as absent.
pub fn build_key(
    prefix: Option<&str>,
    layer: Option<&str>,
    archive: &TileCoord,
    format: KeyFormat,
) -> String {
    let path = archive.to_string();

    let suffix = match layer.filter(|l| !l.is_empty()) {
        Some(layer) => format!("/{}/{}", layer, path),
        None => path,
    };

    let digest = Md5::digest(suffix.as_bytes());
    let hash = format!("/{}", &hex::encode(digest)[..HASH_LENGTH]);

    let prefix = match prefix.filter(|p| !p.is_empty()) {
        Some(prefix) => format!("/{}", prefix),
        None => String::new(),
    };

    // Every part must begin with a slash so the parts join into a path.
    let suffix = if suffix.starts_with('/') {
        suffix
    } else {
        format!("/{}", suffix)
    };

    let key = match format {
        KeyFormat::NoHash => format!("{}{}", prefix, suffix),
        KeyFormat::HashPrefix => format!("{}{}{}", hash, prefix, suffix),
        KeyFormat::PrefixHash => format!("{}{}{}", prefix, hash, suffix),
    };

    key[1..].to_string()
}

/// Fixed key settings of a deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyLayout {
    pub prefix: Option<String>,
    pub layer: Option<String>,
    pub format: KeyFormat,
}

impl KeyLayout {
    pub fn new(prefix: Option<String>, layer: Option<String>, format: KeyFormat) -> Self {
        Self {
            prefix,
            layer,
            format,
        }
    }

    /// Object key of the given metatile under this layout.
    pub fn key_for(&self, archive: &TileCoord) -> String {
        build_key(
            self.prefix.as_deref(),
            self.layer.as_deref(),
            archive,
            self.format,
        )
    }
}
