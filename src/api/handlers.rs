//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};

use crate::cache::Cache;
use crate::error::{CacheError, Result};
use crate::models::{
    validate_key, HealthResponse, SetParams, SetResponse, StatsResponse, SweepResponse,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Shared cache facade
    pub cache: Arc<Cache>,
    /// TTL applied when a write does not specify one
    pub default_ttl: Duration,
}

impl AppState {
    /// Creates a new AppState around the given cache.
    pub fn new(cache: Cache, default_ttl: Duration) -> Self {
        Self {
            cache: Arc::new(cache),
            default_ttl,
        }
    }

    /// Opens the configured backend and wraps it in an AppState.
    pub async fn from_config(config: &crate::config::Config) -> Result<Self> {
        let cache = Cache::from_config(config).await?;
        Ok(Self::new(cache, config.default_ttl()))
    }
}

/// Handler for PUT /cache/:key
///
/// Stores the raw request body under the key with optional `?ttl=` seconds.
pub async fn set_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<SetParams>,
    body: Bytes,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = validate_key(&key) {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let ttl = params.ttl_or(state.default_ttl);
    let size = body.len();
    state.cache.set(&key, body.to_vec(), ttl).await?;

    Ok(Json(SetResponse::new(key, size, ttl.as_secs())))
}

/// Handler for GET /cache/:key
///
/// Returns the stored bytes as `application/octet-stream`.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse> {
    if let Some(error_msg) = validate_key(&key) {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let data = state.cache.get(&key, state.default_ttl).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], data))
}

/// Handler for POST /sweep
///
/// Runs one expiry sweep immediately. Only meaningful for the disk backend.
pub async fn sweep_handler(State(state): State<AppState>) -> Result<Json<SweepResponse>> {
    let report = state.cache.sweep_now().await.ok_or_else(|| {
        CacheError::InvalidRequest(format!(
            "the {} backend expires entries itself",
            state.cache.backend_name()
        ))
    })?;
    Ok(Json(SweepResponse { report }))
}

/// Handler for GET /stats
///
/// Returns current cache statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.cache.stats().into())
}

/// Handler for GET /health
///
/// Returns health status of the server.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(state.cache.backend_name()))
}
