//! Key Hashing Module
//!
//! Maps arbitrary cache keys to stable, filesystem-safe names under the cache
//! root. Nothing here touches the filesystem.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Separator between a readable namespace and the rest of a key.
pub const PREFIX_SEPARATOR: char = '~';

/// Namespaces longer than this are truncated to keep file names short.
const MAX_PREFIX_CHARS: usize = 64;

const DATA_SUFFIX: &str = ".json";
const METADATA_SUFFIX: &str = "-metadata.json";
const LOCK_SUFFIX: &str = ".lock";
const TEMP_SUFFIX: &str = ".tmp";

// == Prefix ==
/// Returns `"<namespace>-"` for keys shaped like `namespace~rest`, otherwise
/// an empty string.
///
/// Characters that are unsafe in a file name are replaced with `_`.
pub fn extract_prefix(key: &str) -> String {
    match key.find(PREFIX_SEPARATOR) {
        Some(idx) => {
            let namespace: String = key[..idx]
                .chars()
                .take(MAX_PREFIX_CHARS)
                .map(|c| {
                    if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                        c
                    } else {
                        '_'
                    }
                })
                .collect();
            format!("{namespace}-")
        }
        None => String::new(),
    }
}

/// Hex-encoded SHA-256 of the key's UTF-8 bytes.
pub fn digest(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Returns true if `name` is a metadata sidecar file name.
pub fn is_metadata_file(name: &str) -> bool {
    name.ends_with(METADATA_SUFFIX)
}

/// Appends the temp suffix to a path.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

// == Entry Paths ==
/// The set of sibling files making up one on-disk entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPaths {
    /// Raw payload
    pub data: PathBuf,
    /// JSON sidecar describing the payload
    pub metadata: PathBuf,
    /// Advisory lock sentinel shared by writers and the sweeper
    pub lock: PathBuf,
}

impl EntryPaths {
    fn from_stem(root: &Path, stem: &str) -> Self {
        Self {
            data: root.join(format!("{stem}{DATA_SUFFIX}")),
            metadata: root.join(format!("{stem}{METADATA_SUFFIX}")),
            lock: root.join(format!("{stem}{LOCK_SUFFIX}")),
        }
    }

    /// Recovers the entry paths from a metadata sidecar path.
    ///
    /// Returns None if the path is not a metadata file.
    pub fn from_metadata_path(metadata: &Path) -> Option<Self> {
        let root = metadata.parent()?;
        let name = metadata.file_name()?.to_str()?;
        let stem = name.strip_suffix(METADATA_SUFFIX)?;
        Some(Self::from_stem(root, stem))
    }
}

// == Key Hasher ==
/// Deterministic key to path mapping rooted at a cache directory.
#[derive(Debug, Clone)]
pub struct KeyHasher {
    root: PathBuf,
}

impl KeyHasher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<prefix><hexdigest>`, shared by every file of an entry.
    pub fn stem(&self, key: &str) -> String {
        format!("{}{}", extract_prefix(key), digest(key))
    }

    /// Path of the data file for `key`.
    pub fn filename(&self, key: &str) -> PathBuf {
        self.paths(key).data
    }

    /// All paths belonging to the entry for `key`.
    pub fn paths(&self, key: &str) -> EntryPaths {
        EntryPaths::from_stem(&self.root, &self.stem(key))
    }
}
