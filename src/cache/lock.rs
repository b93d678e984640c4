//! Entry Locking Module
//!
//! Cross-process mutual exclusion for a single on-disk entry. Acquisition is
//! try-once: a held lock is reported as [`CacheError::LockContention`], never
//! waited on.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use tracing::warn;

use crate::error::{CacheError, IoStep, Result};

// == Lock Capability ==
/// Something that can hand out exclusive, per-entry locks.
pub trait EntryLocker: Send + Sync + fmt::Debug {
    /// Attempts once to lock `sentinel` exclusively.
    fn try_lock(&self, sentinel: &Path) -> Result<EntryLock>;
}

/// Implementation-specific state behind an [`EntryLock`].
pub trait LockHandle: Send {
    fn release(self: Box<Self>) -> io::Result<()>;
}

// == Scoped Lock ==
/// An exclusive lock on one entry, released when dropped.
pub struct EntryLock {
    sentinel: PathBuf,
    handle: Option<Box<dyn LockHandle>>,
}

impl EntryLock {
    pub fn new(sentinel: impl Into<PathBuf>, handle: Box<dyn LockHandle>) -> Self {
        Self {
            sentinel: sentinel.into(),
            handle: Some(handle),
        }
    }

    pub fn sentinel(&self) -> &Path {
        &self.sentinel
    }

    /// Releases the lock, reporting failures instead of logging them.
    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    /// Deletes the sentinel file and then releases the lock.
    ///
    /// The file is unlinked while still held, so a competitor that opened the
    /// old path cannot end up holding a lock nobody else can see.
    pub fn release_and_remove(mut self) -> Result<()> {
        let removed = match std::fs::remove_file(&self.sentinel) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(IoStep::Delete, &self.sentinel, e)),
        };
        let released = self.release_inner();
        removed.and(released)
    }

    fn release_inner(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle
                .release()
                .map_err(|e| CacheError::io(IoStep::Lock, &self.sentinel, e)),
            None => Ok(()),
        }
    }
}

impl Drop for EntryLock {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            warn!("failed to release lock {}: {}", self.sentinel.display(), e);
        }
    }
}

impl fmt::Debug for EntryLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryLock")
            .field("sentinel", &self.sentinel)
            .field("held", &self.handle.is_some())
            .finish()
    }
}

// == File Locker ==
/// Advisory `flock`-style locks on sentinel files, visible across processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileLocker;

struct FileLockHandle {
    file: File,
}

impl LockHandle for FileLockHandle {
    fn release(self: Box<Self>) -> io::Result<()> {
        FileExt::unlock(&self.file)
    }
}

impl EntryLocker for FileLocker {
    fn try_lock(&self, sentinel: &Path) -> Result<EntryLock> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(sentinel)
            .map_err(|e| CacheError::io(IoStep::Lock, sentinel, e))?;

        let acquired = FileExt::try_lock_exclusive(&file)
            .map_err(|e| CacheError::io(IoStep::Lock, sentinel, e))?;
        if !acquired {
            return Err(CacheError::LockContention(sentinel.to_path_buf()));
        }

        // The sentinel may have been reclaimed between open and lock; holding
        // an unlinked file would exclude nobody.
        let linked =
            still_linked(&file, sentinel).map_err(|e| CacheError::io(IoStep::Lock, sentinel, e))?;
        if !linked {
            return Err(CacheError::LockContention(sentinel.to_path_buf()));
        }

        Ok(EntryLock::new(sentinel, Box::new(FileLockHandle { file })))
    }
}

#[cfg(unix)]
fn still_linked(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match std::fs::metadata(path) {
        Ok(current) => Ok(held.dev() == current.dev() && held.ino() == current.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn still_linked(_file: &File, path: &Path) -> io::Result<bool> {
    Ok(path.exists())
}
