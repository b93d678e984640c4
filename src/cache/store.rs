//! Cache Facade Module
//!
//! The caller-facing cache: dispatches to one backend, owns the expiry
//! sweeper for disk caches, and keeps traffic statistics.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cache::stats::StatsRecorder;
use crate::cache::{Backend, CacheStats, FileBackend, RemoteBackend, RemoteStore};
use crate::config::{BackendKind, Config};
use crate::error::{CacheError, Result};
use crate::tasks::{spawn_sweeper_task, ExpirySweeper, SweepReport, SweeperHandle};

// == Cache ==
/// A durable cache over a disk or remote backend.
#[derive(Debug)]
pub struct Cache {
    backend: Arc<dyn Backend>,
    sweeper: Option<ExpirySweeper>,
    sweeper_task: Mutex<Option<SweeperHandle>>,
    stats: StatsRecorder,
}

impl Cache {
    // == Constructors ==
    /// Wraps an arbitrary backend. No sweeper is attached.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            sweeper: None,
            sweeper_task: Mutex::new(None),
            stats: StatsRecorder::default(),
        }
    }

    /// Creates a disk cache. Call [`Cache::start`] to begin expiry sweeps.
    pub fn disk(backend: FileBackend) -> Self {
        let sweeper = ExpirySweeper::new(&backend);
        Self {
            sweeper: Some(sweeper),
            ..Self::new(Arc::new(backend))
        }
    }

    /// Creates a cache over a remote store, which expires entries itself.
    pub fn remote<S: RemoteStore + 'static>(backend: RemoteBackend<S>) -> Self {
        Self::new(Arc::new(backend))
    }

    /// Builds the backend selected by `config`, starting the sweeper for disk.
    pub async fn from_config(config: &Config) -> Result<Self> {
        match config.backend {
            BackendKind::Disk => {
                let cache = Self::disk(FileBackend::new(&config.cache_dir));
                cache.start(config.sweep_interval());
                Ok(cache)
            }
            BackendKind::Redis => {
                let url = config.redis_url.as_deref().ok_or_else(|| {
                    CacheError::InvalidRequest(
                        "REDIS_URL must be set for the redis backend".to_string(),
                    )
                })?;
                let backend = RemoteBackend::redis(url, &config.redis_namespace).await?;
                info!("connected to redis cache");
                Ok(Self::remote(backend))
            }
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    // == Lifecycle ==
    /// Starts periodic expiry sweeps.
    ///
    /// Returns false if the cache has no sweeper or it is already running.
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, interval: Duration) -> bool {
        let Some(sweeper) = &self.sweeper else {
            return false;
        };
        let mut task = self.task_slot();
        if task.is_some() {
            return false;
        }
        *task = Some(spawn_sweeper_task(sweeper.clone(), interval));
        true
    }

    /// Stops the sweeper, waiting for an in-flight sweep to finish.
    pub async fn stop(&self) {
        let handle = self.task_slot().take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    pub fn is_sweeping(&self) -> bool {
        self.task_slot()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Runs one expiry sweep immediately. None for caches without a sweeper.
    pub async fn sweep_now(&self) -> Option<SweepReport> {
        let sweeper = self.sweeper.clone()?;
        match tokio::task::spawn_blocking(move || sweeper.sweep_once()).await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("expiry sweep failed: {}", e);
                None
            }
        }
    }

    fn task_slot(&self) -> MutexGuard<'_, Option<SweeperHandle>> {
        self.sweeper_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // == Get ==
    /// Retrieves the bytes stored under `key`.
    ///
    /// `ttl_hint` is forwarded to the backend, which may ignore it.
    pub async fn get(&self, key: &str, ttl_hint: Duration) -> Result<Vec<u8>> {
        match self.backend.get(key, ttl_hint).await {
            Ok(data) => {
                self.stats.record_hit();
                Ok(data)
            }
            Err(e) => {
                self.stats.record_miss();
                if e.is_not_found() {
                    debug!("cache miss for {}", key);
                } else {
                    warn!("cache read for {} failed: {}", key, e);
                }
                Err(e)
            }
        }
    }

    // == Set ==
    /// Stores `content` under `key` for `ttl`, replacing any previous value.
    pub async fn set(&self, key: &str, content: impl Into<Vec<u8>>, ttl: Duration) -> Result<()> {
        let result = self.backend.set(key, content.into(), ttl).await;
        self.stats.record_set(result.is_ok());
        if let Err(e) = &result {
            if e.is_lock_contention() {
                debug!("cache write for {} skipped: {}", key, e);
            } else {
                warn!("cache write for {} failed: {}", key, e);
            }
        }
        result
    }

    // == Read Through ==
    /// Returns the cached value, or computes, stores and returns it.
    ///
    /// Any read failure is treated as a miss. A failed store after computing
    /// is logged and does not fail the call.
    pub async fn get_or_insert_with<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<Vec<u8>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>>>,
    {
        if let Ok(data) = self.get(key, ttl).await {
            return Ok(data);
        }

        let data = compute().await?;
        // Failure is already counted and logged by set
        let _ = self.set(key, data.clone(), ttl).await;
        Ok(data)
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let reclaimed = self
            .sweeper
            .as_ref()
            .map_or(0, ExpirySweeper::reclaimed_total);
        self.stats.snapshot(reclaimed)
    }
}
