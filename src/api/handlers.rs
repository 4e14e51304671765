//! API Handlers
//!
//! HTTP request handlers for the operator endpoints and the upstream proxy.

use std::sync::Arc;

use axum::{
    extract::{Path, RawQuery, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use tracing::debug;

use crate::config::{Config, FALLBACK_TTL_MINUTES};
use crate::error::{AccessError, Result};
use crate::gateway::{Gateway, HttpUpstream, UpstreamPayload};
use crate::models::{
    CacheModeRequest, CacheModeResponse, EntriesResponse, HealthResponse, InvalidateResponse,
    MaxConcurrentRequest, MaxConcurrentResponse, StatsResponse, TtlRequest, TtlResponse,
    TtlSettingsResponse,
};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Access layer guarding the upstream
    pub gateway: Arc<Gateway<UpstreamPayload>>,
    /// Client for the upstream library server
    pub upstream: Arc<HttpUpstream>,
}

impl AppState {
    pub fn new(gateway: Gateway<UpstreamPayload>, upstream: HttpUpstream) -> Self {
        Self {
            gateway: Arc::new(gateway),
            upstream: Arc::new(upstream),
        }
    }

    /// Creates a new AppState from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let upstream = HttpUpstream::new(
            &config.upstream_url,
            std::time::Duration::from_secs(config.upstream_timeout),
        )?;
        Ok(Self::new(Gateway::from_config(config), upstream))
    }
}

// == Upstream Proxy ==
/// Handler for GET /upstream/:category/*path
///
/// Serves the resource from cache, or fetches it from the upstream through
/// the access pipeline and caches it for the category's TTL.
pub async fn upstream_handler(
    State(state): State<AppState>,
    Path((category, path)): Path<(String, String)>,
    RawQuery(query): RawQuery,
) -> Result<Response> {
    if category.is_empty() || path.is_empty() {
        return Err(AccessError::InvalidRequest(
            "Category and path are required".to_string(),
        ));
    }

    let resource = match query {
        Some(query) => format!("{}?{}", path, query),
        None => path,
    };
    debug!("Proxy request for {}:{}", category, resource);

    let upstream = state.upstream.clone();
    let target = resource.clone();
    let payload = state
        .gateway
        .fetch_category(&category, &resource, move || async move {
            upstream.fetch(&target).await
        })
        .await?;

    let content_type = payload
        .content_type
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
    Ok(([(header::CONTENT_TYPE, content_type)], payload.body).into_response())
}

// == Cache Management ==
/// Handler for GET /cache/entries
pub async fn entries_handler(State(state): State<AppState>) -> Json<EntriesResponse> {
    let cache = state.gateway.cache();
    Json(EntriesResponse::new(cache.mode(), cache.entries().await))
}

/// Handler for DELETE /cache
///
/// Clears the backend of the current mode only.
pub async fn clear_handler(State(state): State<AppState>) -> Json<InvalidateResponse> {
    let removed = state.gateway.cache().clear().await;
    Json(InvalidateResponse::cleared(removed))
}

/// Handler for DELETE /cache/key/*key
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<InvalidateResponse> {
    let removed = state.gateway.cache().invalidate(&key).await;
    Json(InvalidateResponse::key(&key, removed))
}

/// Handler for DELETE /cache/prefix/*prefix
pub async fn invalidate_prefix_handler(
    State(state): State<AppState>,
    Path(prefix): Path<String>,
) -> Result<Json<InvalidateResponse>> {
    if prefix.is_empty() {
        return Err(AccessError::InvalidRequest(
            "Prefix cannot be empty, use DELETE /cache to clear".to_string(),
        ));
    }
    let removed = state.gateway.cache().invalidate_prefix(&prefix).await;
    Ok(Json(InvalidateResponse::prefix(&prefix, removed)))
}

// == Settings ==
/// Handler for GET /settings/cache-mode
pub async fn get_cache_mode_handler(State(state): State<AppState>) -> Json<CacheModeResponse> {
    Json(CacheModeResponse {
        mode: state.gateway.cache_mode(),
    })
}

/// Handler for PUT /settings/cache-mode
pub async fn set_cache_mode_handler(
    State(state): State<AppState>,
    Json(req): Json<CacheModeRequest>,
) -> Result<Json<CacheModeResponse>> {
    let mode = req.parse()?;
    state.gateway.set_cache_mode(mode);
    Ok(Json(CacheModeResponse { mode }))
}

/// Handler for GET /settings/max-concurrent
pub async fn get_max_concurrent_handler(
    State(state): State<AppState>,
) -> Json<MaxConcurrentResponse> {
    Json(MaxConcurrentResponse {
        max_concurrent: state.gateway.max_concurrent(),
    })
}

/// Handler for PUT /settings/max-concurrent
pub async fn set_max_concurrent_handler(
    State(state): State<AppState>,
    Json(req): Json<MaxConcurrentRequest>,
) -> Result<Json<MaxConcurrentResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(AccessError::InvalidRequest(error_msg));
    }
    state.gateway.set_max_concurrent(req.max_concurrent)?;
    Ok(Json(MaxConcurrentResponse {
        max_concurrent: req.max_concurrent,
    }))
}

/// Handler for GET /settings/ttl
pub async fn get_ttls_handler(State(state): State<AppState>) -> Json<TtlSettingsResponse> {
    Json(TtlSettingsResponse {
        ttls: state.gateway.settings().ttls(),
        fallback_minutes: FALLBACK_TTL_MINUTES,
    })
}

/// Handler for PUT /settings/ttl/:category
///
/// Applies to entries written afterwards; cached entries keep their TTL.
pub async fn set_ttl_handler(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Json(req): Json<TtlRequest>,
) -> Result<Json<TtlResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(AccessError::InvalidRequest(error_msg));
    }
    state
        .gateway
        .settings()
        .set_ttl_minutes(&category, req.minutes)?;
    Ok(Json(TtlResponse {
        category,
        minutes: req.minutes,
    }))
}

// == Observability ==
/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::new(state.gateway.stats().await))
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(
        state.gateway.breaker().state().to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheMode;
    use tempfile::TempDir;

    fn test_state(dir: &TempDir) -> AppState {
        let config = Config {
            cache_dir: dir.path().to_path_buf(),
            // Nothing listens on the discard port
            upstream_url: "http://127.0.0.1:9".to_string(),
            breaker_failure_threshold: 2,
            ..Config::default()
        };
        AppState::from_config(&config).unwrap()
    }

    #[tokio::test]
    async fn test_cache_mode_round_trip() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let req = CacheModeRequest {
            mode: "file".to_string(),
        };
        let response = set_cache_mode_handler(State(state.clone()), Json(req))
            .await
            .unwrap();
        assert_eq!(response.mode, CacheMode::File);

        let response = get_cache_mode_handler(State(state)).await;
        assert_eq!(response.mode, CacheMode::File);
    }

    #[tokio::test]
    async fn test_invalid_cache_mode() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let req = CacheModeRequest {
            mode: "redis".to_string(),
        };
        let result = set_cache_mode_handler(State(state), Json(req)).await;
        assert!(matches!(result, Err(AccessError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_max_concurrent_handlers() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let req = MaxConcurrentRequest { max_concurrent: 7 };
        set_max_concurrent_handler(State(state.clone()), Json(req))
            .await
            .unwrap();
        assert_eq!(get_max_concurrent_handler(State(state.clone())).await.max_concurrent, 7);

        let req = MaxConcurrentRequest { max_concurrent: 0 };
        let result = set_max_concurrent_handler(State(state), Json(req)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_set_ttl_handler() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let req = TtlRequest { minutes: 3 };
        let response = set_ttl_handler(State(state.clone()), Path("series".to_string()), Json(req))
            .await
            .unwrap();
        assert_eq!(response.minutes, 3);

        let ttls = get_ttls_handler(State(state)).await;
        assert_eq!(ttls.ttls.get("series"), Some(&3));
        assert_eq!(ttls.fallback_minutes, FALLBACK_TTL_MINUTES);
    }

    #[tokio::test]
    async fn test_invalidation_handlers() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        let cache = state.gateway.cache();
        let payload = UpstreamPayload::new(None, b"x".to_vec());
        cache.set("series:1", payload.clone(), 60).await.unwrap();
        cache.set("series:2", payload.clone(), 60).await.unwrap();
        cache.set("books:1", payload, 60).await.unwrap();

        let response = invalidate_handler(State(state.clone()), Path("books:1".to_string())).await;
        assert_eq!(response.removed, 1);

        let response =
            invalidate_prefix_handler(State(state.clone()), Path("series:".to_string()))
                .await
                .unwrap();
        assert_eq!(response.removed, 2);

        let entries = entries_handler(State(state)).await;
        assert_eq!(entries.count, 0);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_maps_to_bad_gateway() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let result = upstream_handler(
            State(state.clone()),
            Path(("books".to_string(), "api/books/1".to_string())),
            RawQuery(None),
        )
        .await;

        match result {
            Err(err) => assert!(matches!(err, AccessError::Upstream(_))),
            Ok(_) => panic!("expected an upstream failure"),
        }
        assert_eq!(state.gateway.breaker().failure_count(), 1);
    }

    #[tokio::test]
    async fn test_health_reports_breaker_state() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let response = health_handler(State(state)).await;
        assert_eq!(response.status, "healthy");
        assert_eq!(response.upstream, "closed");
    }
}
