//! API Module
//!
//! HTTP handlers and routing for the operator REST API and upstream proxy.
//!
//! # Endpoints
//! - `GET /upstream/:category/*path` - Fetch an upstream resource through the access layer
//! - `GET /cache/entries` - List cached entries of the current mode
//! - `DELETE /cache` - Clear the current mode's backend
//! - `DELETE /cache/key/*key` - Invalidate one key
//! - `DELETE /cache/prefix/*prefix` - Invalidate all keys with a prefix
//! - `GET|PUT /settings/cache-mode` - Read or switch the cache mode
//! - `GET|PUT /settings/max-concurrent` - Read or change the concurrency limit
//! - `GET /settings/ttl`, `PUT /settings/ttl/:category` - Category TTLs
//! - `GET /stats` - Access layer statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
