//! Configuration Module
//!
//! Handles loading cache configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Which storage backend the cache dispatches to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    /// Local filesystem under `cache_dir`
    Disk,
    /// Redis at `redis_url`
    Redis,
}

impl BackendKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "disk" | "file" => Some(BackendKind::Disk),
            "redis" => Some(BackendKind::Redis),
            _ => None,
        }
    }
}

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Selected backend
    pub backend: BackendKind,
    /// Root directory for the disk backend
    pub cache_dir: PathBuf,
    /// Connection URL for the redis backend
    pub redis_url: Option<String>,
    /// Key prefix applied to every redis key
    pub redis_namespace: String,
    /// Expiry sweep interval in seconds
    pub sweep_interval: u64,
    /// TTL in seconds for writes that do not specify one
    pub default_ttl: u64,
    /// HTTP server port
    pub server_port: u16,
}

/// Default redis key namespace.
pub const DEFAULT_NAMESPACE: &str = "_CACHE_";

fn default_cache_dir() -> PathBuf {
    env::temp_dir().join("durable_cache")
}

fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_BACKEND` - `disk` or `redis` (default: disk)
    /// - `CACHE_DIR` - Disk cache root (default: `<tmp>/durable_cache`)
    /// - `REDIS_URL` - Redis connection URL (required for the redis backend)
    /// - `REDIS_NAMESPACE` - Redis key prefix (default: `_CACHE_`)
    /// - `SWEEP_INTERVAL` - Expiry sweep frequency in seconds (default: 60)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            backend: env::var("CACHE_BACKEND")
                .ok()
                .and_then(|v| BackendKind::parse(&v))
                .unwrap_or(defaults.backend),
            cache_dir: env::var("CACHE_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty()),
            redis_namespace: env::var("REDIS_NAMESPACE")
                .ok()
                .unwrap_or(defaults.redis_namespace),
            sweep_interval: parsed::<u64>("SWEEP_INTERVAL")
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.sweep_interval),
            default_ttl: parsed("DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            server_port: parsed("SERVER_PORT").unwrap_or(defaults.server_port),
        }
    }

    /// Sweep interval as a Duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }

    /// Default TTL as a Duration.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Disk,
            cache_dir: default_cache_dir(),
            redis_url: None,
            redis_namespace: DEFAULT_NAMESPACE.to_string(),
            sweep_interval: 60,
            default_ttl: 300,
            server_port: 3000,
        }
    }
}
