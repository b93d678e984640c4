//! API Module
//!
//! HTTP handlers and routing exposing the cache to blob consumers.
//!
//! # Endpoints
//! - `PUT /cache/:key` - Store the request body (optional `?ttl=` seconds)
//! - `GET /cache/:key` - Retrieve stored bytes
//! - `POST /sweep` - Run one expiry sweep (disk backend)
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
