//! Response DTOs for the cache server API
//!
//! Defines the structure of outgoing JSON response bodies.

use serde::Serialize;

use crate::cache::CacheStats;
use crate::tasks::SweepReport;

/// Response body for the SET operation (PUT /cache/:key)
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    /// Success message
    pub message: String,
    /// The key that was set
    pub key: String,
    /// Stored payload size in bytes
    pub size: usize,
    /// TTL applied, in seconds
    pub ttl: u64,
}

impl SetResponse {
    /// Creates a new SetResponse
    pub fn new(key: impl Into<String>, size: usize, ttl: u64) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
            size,
            ttl,
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of successful writes
    pub sets: u64,
    /// Number of failed writes
    pub set_failures: u64,
    /// Entries reclaimed by the expiry sweeper
    pub reclaimed: u64,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            hits: stats.hits,
            misses: stats.misses,
            sets: stats.sets,
            set_failures: stats.set_failures,
            reclaimed: stats.reclaimed,
        }
    }
}

/// Response body for a manual sweep (POST /sweep)
#[derive(Debug, Clone, Serialize)]
pub struct SweepResponse {
    /// What the sweep did
    #[serde(flatten)]
    pub report: SweepReport,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Active backend name
    pub backend: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy(backend: impl Into<String>) -> Self {
        Self {
            status: "healthy".to_string(),
            backend: backend.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
