//! Remote Backend Module
//!
//! Thin adapter over an external key/value store that enforces expiry itself,
//! so no local sweeper or locking is involved.

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use crate::cache::Backend;
use crate::config::DEFAULT_NAMESPACE;
use crate::error::{CacheError, Result};

// == Remote Store ==
/// Minimal key/value store with native TTL.
#[async_trait]
pub trait RemoteStore: Send + Sync + fmt::Debug {
    /// Returns the value, or None when absent or expired.
    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores `value`, letting the store expire it after `ttl`.
    async fn store(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;
}

// == Redis Store ==
/// Redis connection shared across callers.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connects to the Redis server at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

/// Largest `SET EX` value Redis accepts once it converts the expiry to an
/// absolute millisecond timestamp.
const MAX_TTL_SECONDS: u64 = (i64::MAX / 2000) as u64;

/// Redis expiry is whole seconds; round up and never pass zero.
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl
        .as_secs()
        .saturating_add(u64::from(ttl.subsec_nanos() > 0));
    secs.clamp(1, MAX_TTL_SECONDS)
}

#[async_trait]
impl RemoteStore for RedisStore {
    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn store(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl_seconds(ttl)).await?;
        Ok(())
    }
}

// == Remote Backend ==
/// Cache backend that namespaces keys into a [`RemoteStore`].
#[derive(Debug, Clone)]
pub struct RemoteBackend<S> {
    store: S,
    namespace: String,
}

impl<S: RemoteStore> RemoteBackend<S> {
    pub fn new(store: S) -> Self {
        Self::with_namespace(store, DEFAULT_NAMESPACE)
    }

    pub fn with_namespace(store: S, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    /// The key as stored remotely.
    pub fn remote_key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl RemoteBackend<RedisStore> {
    /// Connects a Redis-backed remote backend.
    pub async fn redis(url: &str, namespace: &str) -> Result<Self> {
        Ok(Self::with_namespace(RedisStore::connect(url).await?, namespace))
    }
}

#[async_trait]
impl<S: RemoteStore> Backend for RemoteBackend<S> {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn get(&self, key: &str, _ttl_hint: Duration) -> Result<Vec<u8>> {
        let started = Instant::now();
        let result = self
            .store
            .fetch(&self.remote_key(key))
            .await
            .and_then(|value| value.ok_or_else(|| CacheError::NotFound(key.to_string())));
        debug!(
            "remote cache get completed in {:?} for {} (hit: {})",
            started.elapsed(),
            key,
            result.is_ok()
        );
        result
    }

    async fn set(&self, key: &str, content: Vec<u8>, ttl: Duration) -> Result<()> {
        let started = Instant::now();
        let result = self.store.store(&self.remote_key(key), content, ttl).await;
        debug!(
            "remote cache set completed in {:?} for {}",
            started.elapsed(),
            key
        );
        result
    }
}
