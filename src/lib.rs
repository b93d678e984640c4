//! Durable Cache - a content-addressed blob cache
//!
//! Stores opaque payloads on the local filesystem with atomic replacement,
//! cross-process entry locks and background expiry, or in Redis with native
//! TTLs.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{Backend, Cache, FileBackend, RemoteBackend};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::{spawn_sweeper_task, ExpirySweeper};
