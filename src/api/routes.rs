//! API Routes
//!
//! Configures the Axum router with all cache server endpoints.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    get_handler, health_handler, set_handler, stats_handler, sweep_handler, AppState,
};

/// Largest accepted payload
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
/// - Body limit: payloads up to [`MAX_BODY_BYTES`]
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/cache/:key", get(get_handler).put(set_handler))
        .route("/sweep", post(sweep_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, FileBackend};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::time::Duration;
    use tower::util::ServiceExt;

    fn create_test_app(dir: &tempfile::TempDir) -> Router {
        let cache = Cache::disk(FileBackend::new(dir.path()));
        create_router(AppState::new(cache, Duration::from_secs(300)))
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_test_app(&dir);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_set_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_test_app(&dir);

        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/cache/test")
                    .body(Body::from("hello"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_test_app(&dir);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/cache/nonexistent")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
