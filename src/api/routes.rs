//! API Routes
//!
//! Configures the Axum router with the operator endpoints and the upstream
//! proxy.

use axum::{
    routing::{delete, get, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    clear_handler, entries_handler, get_cache_mode_handler, get_max_concurrent_handler,
    get_ttls_handler, health_handler, invalidate_handler, invalidate_prefix_handler,
    set_cache_mode_handler, set_max_concurrent_handler, set_ttl_handler, stats_handler,
    upstream_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// Cache keys contain `/` (`"{category}:{path}"`), so the key and prefix
/// routes capture the rest of the path.
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/upstream/:category/*path", get(upstream_handler))
        .route("/cache", delete(clear_handler))
        .route("/cache/entries", get(entries_handler))
        .route("/cache/key/*key", delete(invalidate_handler))
        .route("/cache/prefix/*prefix", delete(invalidate_prefix_handler))
        .route(
            "/settings/cache-mode",
            get(get_cache_mode_handler).put(set_cache_mode_handler),
        )
        .route(
            "/settings/max-concurrent",
            get(get_max_concurrent_handler).put(set_max_concurrent_handler),
        )
        .route("/settings/ttl", get(get_ttls_handler))
        .route("/settings/ttl/:category", put(set_ttl_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
