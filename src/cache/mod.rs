//! Cache Module
//!
//! Durable key/value caching over a pluggable backend: the local filesystem
//! with expiry sweeping, or a remote store with native TTLs.

mod backend;
mod file;
pub mod keys;
pub mod lock;
mod metadata;
mod remote;
mod stats;
mod store;


// Re-export public types
pub use backend::Backend;
pub use file::FileBackend;
pub use keys::{EntryPaths, KeyHasher};
pub use lock::{EntryLock, EntryLocker, FileLocker, LockHandle};
pub use metadata::EntryMetadata;
pub use remote::{RedisStore, RemoteBackend, RemoteStore};
pub use stats::CacheStats;
pub use store::Cache;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 1024;
