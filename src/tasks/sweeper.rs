//! Expiry Sweeper Task
//!
//! Background task that periodically reclaims expired disk cache entries.
//!
//! A sweep reads every metadata sidecar under the cache root. Expired entries
//! are deleted under the same lock writers take, data file first and metadata
//! second, so a reader either finds a live entry or a clean miss. Entries that
//! are locked or unreadable are left for a later tick.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::cache::keys::{is_metadata_file, EntryPaths};
use crate::cache::lock::EntryLocker;
use crate::cache::{EntryMetadata, FileBackend};
use crate::error::{CacheError, IoStep, Result};

// == Sweep Report ==
/// What a single sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Metadata files looked at
    pub examined: usize,
    /// Expired entries deleted
    pub reclaimed: usize,
    /// Expired entries skipped because their lock was held
    pub skipped_locked: usize,
    /// Sidecars that could not be parsed
    pub skipped_malformed: usize,
    /// Entries whose reclamation failed with an I/O error, or 1 when the
    /// root itself could not be listed
    pub failed: usize,
}

enum Outcome {
    Live,
    Reclaimed,
    Gone,
}

// == Expiry Sweeper ==
/// Reclaims expired entries from one cache root.
#[derive(Debug, Clone)]
pub struct ExpirySweeper {
    root: PathBuf,
    locker: Arc<dyn EntryLocker>,
    reclaimed_total: Arc<AtomicU64>,
}

impl ExpirySweeper {
    /// Creates a sweeper for the backend's root, sharing its lock provider.
    pub fn new(backend: &FileBackend) -> Self {
        Self {
            root: backend.root().to_path_buf(),
            locker: backend.locker(),
            reclaimed_total: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Entries reclaimed by this sweeper (and its clones) so far.
    pub fn reclaimed_total(&self) -> u64 {
        self.reclaimed_total.load(Ordering::Relaxed)
    }

    /// Runs one sweep against the current time.
    pub fn sweep_once(&self) -> SweepReport {
        self.sweep_at(Utc::now())
    }

    /// Runs one sweep treating `now` as the current time.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("cache directory {} does not exist yet", self.root.display());
                return report;
            }
            Err(e) => {
                error!("{}", CacheError::io(IoStep::ListDir, &self.root, e));
                report.failed += 1;
                return report;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("failed to read entry in {}: {}", self.root.display(), e);
                    report.failed += 1;
                    continue;
                }
            };
            let is_sidecar = entry
                .file_name()
                .to_str()
                .is_some_and(is_metadata_file);
            if !is_sidecar {
                continue;
            }

            report.examined += 1;
            let metadata_path = entry.path();
            match self.reclaim_if_expired(&metadata_path, now) {
                Ok(Outcome::Reclaimed) => report.reclaimed += 1,
                Ok(Outcome::Live) | Ok(Outcome::Gone) => {}
                Err(CacheError::LockContention(lock)) => {
                    info!(
                        "cache entry {} is locked by another writer, skipping",
                        lock.display()
                    );
                    report.skipped_locked += 1;
                }
                Err(e @ CacheError::MalformedMetadata { .. }) => {
                    error!("{}", e);
                    report.skipped_malformed += 1;
                }
                Err(e) => {
                    error!(
                        "failed to reclaim {}: {}",
                        metadata_path.display(),
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        self.reclaimed_total
            .fetch_add(report.reclaimed as u64, Ordering::Relaxed);
        report
    }

    fn reclaim_if_expired(&self, metadata_path: &Path, now: DateTime<Utc>) -> Result<Outcome> {
        let Some(metadata) = load_if_present(metadata_path)? else {
            return Ok(Outcome::Gone);
        };
        if !metadata.is_expired_at(now) {
            return Ok(Outcome::Live);
        }

        let paths = EntryPaths::from_metadata_path(metadata_path).ok_or_else(|| {
            CacheError::Internal(format!(
                "not a metadata path: {}",
                metadata_path.display()
            ))
        })?;

        let lock = self.locker.try_lock(&paths.lock)?;

        // A writer may have refreshed or another sweeper removed the entry
        // between the first read and taking the lock.
        let Some(metadata) = load_if_present(metadata_path)? else {
            lock.release_and_remove()?;
            return Ok(Outcome::Gone);
        };
        if !metadata.is_expired_at(now) {
            return Ok(Outcome::Live);
        }

        debug!(
            "deleting expired cache file {} and its metadata",
            paths.data.display()
        );
        remove_if_present(&paths.data)?;
        remove_if_present(&paths.metadata)?;

        if let Err(e) = lock.release_and_remove() {
            warn!("{}", e);
        }
        Ok(Outcome::Reclaimed)
    }
}

/// Loads a sidecar, or None if another actor already removed it.
fn load_if_present(path: &Path) -> Result<Option<EntryMetadata>> {
    match EntryMetadata::load(path) {
        Ok(metadata) => Ok(Some(metadata)),
        Err(CacheError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::io(IoStep::Delete, path, e)),
    }
}

// == Task Lifecycle ==
/// Owns a running sweeper task.
///
/// Dropping the handle also stops the task at its next wake-up.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signals the task to stop and waits for an in-flight sweep to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!("expiry sweeper task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawns a task running `sweeper` every `interval` until stopped.
///
/// The first sweep happens one interval after start. A slow sweep delays the
/// following tick rather than skipping it.
///
/// # Example
/// ```ignore
/// let sweeper = ExpirySweeper::new(&backend);
/// let handle = spawn_sweeper_task(sweeper, Duration::from_secs(60));
/// // Later, during shutdown:
/// handle.stop().await;
/// ```
pub fn spawn_sweeper_task(sweeper: ExpirySweeper, interval: Duration) -> SweeperHandle {
    let (shutdown, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        info!(
            "Starting expiry sweeper for {} with interval of {:?}",
            sweeper.root().display(),
            interval
        );

        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_rx.changed() => break,
            }

            let pass = sweeper.clone();
            match tokio::task::spawn_blocking(move || pass.sweep_once()).await {
                Ok(report) if report.reclaimed > 0 => {
                    info!(
                        "expiry sweep: reclaimed {} of {} entries ({} locked, {} malformed, {} failed)",
                        report.reclaimed,
                        report.examined,
                        report.skipped_locked,
                        report.skipped_malformed,
                        report.failed
                    );
                }
                Ok(report) => {
                    debug!("expiry sweep: nothing reclaimed ({} entries examined)", report.examined);
                }
                Err(e) => error!("expiry sweep panicked: {}", e),
            }
        }

        info!("Expiry sweeper for {} stopped", sweeper.root().display());
    });

    SweeperHandle { shutdown, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys::temp_path;
    use crate::cache::lock::FileLocker;

    const TTL: Duration = Duration::from_secs(1);

    fn later(secs: i64) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::seconds(secs)
    }

    #[test]
    fn test_sweep_reclaims_expired_entries() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        let sweeper = ExpirySweeper::new(&backend);

        backend.write("expire_soon", b"value", TTL).unwrap();
        backend
            .write("long_lived", b"value", Duration::from_secs(3600))
            .unwrap();
        let paths = backend.hasher().paths("expire_soon");

        let report = sweeper.sweep_at(later(10));

        assert_eq!(report.examined, 2);
        assert_eq!(report.reclaimed, 1);
        assert!(!paths.data.exists());
        assert!(!paths.metadata.exists());
        assert!(!paths.lock.exists());
        assert!(backend.read("expire_soon").unwrap_err().is_not_found());
        assert_eq!(backend.read("long_lived").unwrap(), b"value");
        assert_eq!(sweeper.reclaimed_total(), 1);
    }

    #[test]
    fn test_sweep_preserves_live_entries() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        let sweeper = ExpirySweeper::new(&backend);

        backend.write("key", b"value", TTL).unwrap();

        let report = sweeper.sweep_once();
        assert_eq!(report.examined, 1);
        assert_eq!(report.reclaimed, 0);
        assert_eq!(backend.read("key").unwrap(), b"value");
    }

    #[test]
    fn test_sweep_skips_locked_entry_until_released() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        let sweeper = ExpirySweeper::new(&backend);

        backend.write("busy", b"value", TTL).unwrap();
        let paths = backend.hasher().paths("busy");

        // Simulates a writer in progress, possibly in another process
        let held = FileLocker.try_lock(&paths.lock).unwrap();

        let report = sweeper.sweep_at(later(10));
        assert_eq!(report.skipped_locked, 1);
        assert_eq!(report.reclaimed, 0);
        assert!(paths.data.exists());
        assert!(paths.metadata.exists());

        drop(held);

        let report = sweeper.sweep_at(later(10));
        assert_eq!(report.reclaimed, 1);
        assert!(!paths.data.exists());
    }

    #[test]
    fn test_sweep_skips_malformed_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        let sweeper = ExpirySweeper::new(&backend);

        backend.write("corrupt", b"intact", TTL).unwrap();
        backend.write("expired", b"gone", TTL).unwrap();
        let corrupt = backend.hasher().paths("corrupt");
        fs::write(&corrupt.metadata, b"{ this is not json").unwrap();

        let report = sweeper.sweep_at(later(10));

        assert_eq!(report.examined, 2);
        assert_eq!(report.skipped_malformed, 1);
        assert_eq!(report.reclaimed, 1);
        assert!(corrupt.data.exists());
        assert!(corrupt.metadata.exists());
        assert_eq!(backend.read("corrupt").unwrap(), b"intact");
        assert!(backend.read("expired").unwrap_err().is_not_found());
    }

    #[test]
    fn test_sweep_ignores_non_metadata_files() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        let sweeper = ExpirySweeper::new(&backend);

        backend.write("key", b"value", TTL).unwrap();
        let paths = backend.hasher().paths("key");
        fs::write(temp_path(&paths.data), b"leftover").unwrap();
        fs::write(dir.path().join("README"), b"hello").unwrap();

        let report = sweeper.sweep_at(later(10));
        assert_eq!(report.examined, 1);
        assert_eq!(report.reclaimed, 1);
        assert!(dir.path().join("README").exists());
    }

    #[test]
    fn test_sweep_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("never-created"));
        let sweeper = ExpirySweeper::new(&backend);

        assert_eq!(sweeper.sweep_once(), SweepReport::default());
    }

    #[cfg(unix)]
    #[test]
    fn test_sweep_unlistable_root_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("not-a-dir");
        fs::write(&root, b"").unwrap();
        let sweeper = ExpirySweeper::new(&FileBackend::new(&root));

        let report = sweeper.sweep_once();
        assert_eq!(report.failed, 1);
        assert_eq!(report.examined, 0);
    }

    #[test]
    fn test_sweep_tolerates_missing_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        let sweeper = ExpirySweeper::new(&backend);

        backend.write("orphan", b"value", TTL).unwrap();
        let paths = backend.hasher().paths("orphan");
        fs::remove_file(&paths.data).unwrap();

        let report = sweeper.sweep_at(later(10));
        assert_eq!(report.reclaimed, 1);
        assert!(!paths.metadata.exists());
    }

    #[tokio::test]
    async fn test_sweeper_task_reclaims_expired_entries() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        backend.write("expire_soon", b"value", TTL).unwrap();

        let handle = spawn_sweeper_task(ExpirySweeper::new(&backend), Duration::from_millis(500));

        // Wait for the entry to expire and a sweep to run
        tokio::time::sleep(Duration::from_millis(2600)).await;

        assert!(backend.read("expire_soon").unwrap_err().is_not_found());
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_sweeper_task_can_be_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());

        let handle = spawn_sweeper_task(ExpirySweeper::new(&backend), Duration::from_secs(60));
        assert!(!handle.is_finished());

        tokio::time::timeout(Duration::from_secs(5), handle.stop())
            .await
            .expect("stop should not wait for the next tick");
    }
}
