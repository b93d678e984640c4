//! Backend Module
//!
//! The storage capability every cache backend provides.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Key/value storage with per-write expiry.
///
/// Implementations guarantee that a reader sees either the complete previous
/// value or the complete new value for a key, never a partial write.
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    /// Short name used in logs and health output.
    fn name(&self) -> &'static str;

    /// Returns the stored bytes, or [`CacheError::NotFound`] on a miss.
    ///
    /// `ttl_hint` is accepted for signature uniformity; backends may ignore it.
    ///
    /// [`CacheError::NotFound`]: crate::error::CacheError::NotFound
    async fn get(&self, key: &str, ttl_hint: Duration) -> Result<Vec<u8>>;

    /// Stores `content` under `key`, replacing any previous value.
    async fn set(&self, key: &str, content: Vec<u8>, ttl: Duration) -> Result<()>;
}
