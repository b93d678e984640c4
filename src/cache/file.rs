//! File Backend Module
//!
//! Durable storage on the local filesystem. Each entry is a data file plus a
//! JSON metadata sidecar; both are replaced by rename so readers never see a
//! partial write. Writers serialize through the entry's lock sentinel.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::cache::keys::{temp_path, KeyHasher};
use crate::cache::lock::{EntryLocker, FileLocker};
use crate::cache::metadata::EntryMetadata;
use crate::cache::Backend;
use crate::error::{CacheError, IoStep, Result};

// == File Backend ==
/// Filesystem-backed cache storage rooted at one directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    hasher: KeyHasher,
    locker: Arc<dyn EntryLocker>,
}

impl FileBackend {
    /// Creates a backend using advisory file locks.
    ///
    /// The directory is created lazily on the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_locker(root, Arc::new(FileLocker))
    }

    /// Creates a backend with a custom lock implementation.
    ///
    /// A relative root is resolved against the current directory so sidecars
    /// always record absolute data paths.
    pub fn with_locker(root: impl Into<PathBuf>, locker: Arc<dyn EntryLocker>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self {
            hasher: KeyHasher::new(root),
            locker,
        }
    }

    pub fn root(&self) -> &Path {
        self.hasher.root()
    }

    pub fn hasher(&self) -> &KeyHasher {
        &self.hasher
    }

    pub fn locker(&self) -> Arc<dyn EntryLocker> {
        Arc::clone(&self.locker)
    }

    // == Read ==
    /// Reads the payload for `key`. Takes no lock.
    pub fn read(&self, key: &str) -> Result<Vec<u8>> {
        let started = Instant::now();
        let filename = self.hasher.filename(key);

        let result = match fs::read(&filename) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(CacheError::NotFound(key.to_string()))
            }
            Err(e) => Err(CacheError::io(IoStep::Read, &filename, e)),
        };

        debug!(
            "disk cache get completed in {:?} for {} (file: {}, hit: {})",
            started.elapsed(),
            key,
            filename.display(),
            result.is_ok()
        );
        result
    }

    // == Write ==
    /// Stores `content` under `key` for `ttl`.
    pub fn write(&self, key: &str, content: &[u8], ttl: Duration) -> Result<()> {
        self.write_at(key, content, ttl, Utc::now())
    }

    /// Stores `content` as if written at `now`.
    pub fn write_at(
        &self,
        key: &str,
        content: &[u8],
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let started = Instant::now();
        let paths = self.hasher.paths(key);

        self.ensure_root()?;

        let metadata = EntryMetadata::new(key, &paths.data, now, ttl);
        let metadata_json = metadata.to_json()?;

        let _lock = self.locker.try_lock(&paths.lock)?;

        // Both temp files are complete before either rename, so a failed
        // write never exposes the new payload.
        let data_tmp = temp_path(&paths.data);
        let metadata_tmp = temp_path(&paths.metadata);
        let result = write_temp(&data_tmp, content)
            .and_then(|()| write_temp(&metadata_tmp, &metadata_json))
            .and_then(|()| rename_into(&data_tmp, &paths.data))
            .and_then(|()| rename_into(&metadata_tmp, &paths.metadata));

        if result.is_err() {
            discard(&data_tmp);
            discard(&metadata_tmp);
        }

        debug!(
            "disk cache set completed in {:?} for {} (file: {}, ok: {})",
            started.elapsed(),
            key,
            paths.data.display(),
            result.is_ok()
        );
        result
    }

    fn ensure_root(&self) -> Result<()> {
        let root = self.root();
        if root.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(root).map_err(|e| CacheError::io(IoStep::CreateDir, root, e))?;
        info!("cache directory {} created", root.display());
        Ok(())
    }
}

/// Writes `content` to `tmp` and flushes it to disk.
fn write_temp(tmp: &Path, content: &[u8]) -> Result<()> {
    let write = || -> io::Result<()> {
        let mut file = File::create(tmp)?;
        file.write_all(content)?;
        file.sync_all()
    };
    write().map_err(|e| CacheError::io(IoStep::WriteTemp, tmp, e))
}

fn rename_into(tmp: &Path, dest: &Path) -> Result<()> {
    fs::rename(tmp, dest).map_err(|e| CacheError::io(IoStep::Rename, dest, e))
}

fn discard(tmp: &Path) {
    match fs::remove_file(tmp) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => debug!("failed to remove temp file {}: {}", tmp.display(), e),
    }
}

#[async_trait]
impl Backend for FileBackend {
    fn name(&self) -> &'static str {
        "disk"
    }

    async fn get(&self, key: &str, _ttl_hint: Duration) -> Result<Vec<u8>> {
        let backend = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || backend.read(&key))
            .await
            .map_err(|e| CacheError::Internal(format!("disk read task failed: {e}")))?
    }

    async fn set(&self, key: &str, content: Vec<u8>, ttl: Duration) -> Result<()> {
        let backend = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || backend.write(&key, &content, ttl))
            .await
            .map_err(|e| CacheError::Internal(format!("disk write task failed: {e}")))?
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(300);

    #[test]
    fn test_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());

        backend.write("key1", b"value1", TTL).unwrap();
        assert_eq!(backend.read("key1").unwrap(), b"value1");
    }

    #[test]
    fn test_read_nonexistent() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());

        let result = backend.read("nonexistent");
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[test]
    fn test_write_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("cache");
        let backend = FileBackend::new(&root);

        backend.write("key1", b"v", TTL).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn test_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());

        backend.write("key1", b"value1", TTL).unwrap();
        backend.write("key1", b"value2", TTL).unwrap();
        assert_eq!(backend.read("key1").unwrap(), b"value2");
    }

    #[test]
    fn test_write_leaves_expected_files() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        let paths = backend.hasher().paths("ns~key");

        backend.write("ns~key", b"payload", TTL).unwrap();

        assert!(paths.data.exists());
        assert!(paths.metadata.exists());
        assert!(!temp_path(&paths.data).exists());
        assert!(!temp_path(&paths.metadata).exists());

        let metadata = EntryMetadata::load(&paths.metadata).unwrap();
        assert_eq!(metadata.key, "ns~key");
        assert_eq!(metadata.filename, paths.data);
        assert_eq!(metadata.expire - metadata.set, chrono::Duration::seconds(300));
    }

    #[test]
    fn test_write_rejected_while_locked() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        backend.write("key1", b"old", TTL).unwrap();

        let held = FileLocker
            .try_lock(&backend.hasher().paths("key1").lock)
            .unwrap();
        let result = backend.write("key1", b"new", TTL);
        assert!(matches!(result, Err(CacheError::LockContention(_))));

        // The previous entry is untouched
        assert_eq!(backend.read("key1").unwrap(), b"old");

        drop(held);
        backend.write("key1", b"new", TTL).unwrap();
        assert_eq!(backend.read("key1").unwrap(), b"new");
    }

    #[test]
    fn test_failed_write_keeps_previous_entry() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        backend.write("key1", b"old", TTL).unwrap();

        // A directory squatting on the temp path makes the temp write fail
        let paths = backend.hasher().paths("key1");
        fs::create_dir(temp_path(&paths.data)).unwrap();

        let result = backend.write("key1", b"new", TTL);
        assert!(matches!(
            result,
            Err(CacheError::Io {
                step: IoStep::WriteTemp,
                ..
            })
        ));
        assert_eq!(backend.read("key1").unwrap(), b"old");
    }

    #[test]
    fn test_failed_metadata_write_keeps_previous_entry() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        backend.write("key1", b"old", TTL).unwrap();
        let paths = backend.hasher().paths("key1");
        let before = EntryMetadata::load(&paths.metadata).unwrap();

        fs::create_dir(temp_path(&paths.metadata)).unwrap();

        let result = backend.write("key1", b"new", Duration::from_secs(1));
        assert!(matches!(
            result,
            Err(CacheError::Io {
                step: IoStep::WriteTemp,
                ..
            })
        ));

        // Neither the payload nor the sidecar moved
        assert_eq!(backend.read("key1").unwrap(), b"old");
        assert_eq!(EntryMetadata::load(&paths.metadata).unwrap(), before);
        assert!(!temp_path(&paths.data).exists());
    }

    #[test]
    fn test_relative_root_records_absolute_paths() {
        let backend = FileBackend::new("relative_cache_root");
        assert!(backend.root().is_absolute());
        assert!(backend.root().ends_with("relative_cache_root"));

        let paths = backend.hasher().paths("k");
        let metadata = EntryMetadata::new("k", &paths.data, Utc::now(), TTL);
        assert!(metadata.filename.is_absolute());
    }

    #[test]
    fn test_root_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("not-a-dir");
        fs::write(&root, b"").unwrap();
        let backend = FileBackend::new(&root);

        let result = backend.write("key1", b"v", TTL);
        assert!(matches!(
            result,
            Err(CacheError::Io {
                step: IoStep::CreateDir,
                ..
            })
        ));
    }

    #[test]
    fn test_binary_payload() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        let payload: Vec<u8> = (0..=255).collect();

        backend.write("bin", &payload, TTL).unwrap();
        assert_eq!(backend.read("bin").unwrap(), payload);
    }

    #[tokio::test]
    async fn test_backend_trait_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn Backend> = Arc::new(FileBackend::new(dir.path()));

        backend.set("k", b"v".to_vec(), TTL).await.unwrap();
        assert_eq!(backend.get("k", TTL).await.unwrap(), b"v");
        assert!(backend.get("other", TTL).await.unwrap_err().is_not_found());
        assert_eq!(backend.name(), "disk");
    }
}
