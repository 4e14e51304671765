//! Integration Tests for API Endpoints
//!
//! Drives the full router against a local fake upstream server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, Request, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use upstream_guard::{api::create_router, AppState, Config};

// == Fake Upstream ==

#[derive(Clone, Default)]
struct UpstreamHits(Arc<AtomicUsize>);

impl UpstreamHits {
    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

async fn series(State(hits): State<UpstreamHits>, Path(id): Path<u32>) -> impl IntoResponse {
    hits.0.fetch_add(1, Ordering::SeqCst);
    (
        [(header::CONTENT_TYPE, "application/json")],
        format!(r#"{{"id":{},"title":"Series {}"}}"#, id, id),
    )
}

async fn slow(State(hits): State<UpstreamHits>) -> &'static str {
    hits.0.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(200)).await;
    "slow body"
}

async fn broken(State(hits): State<UpstreamHits>) -> StatusCode {
    hits.0.fetch_add(1, Ordering::SeqCst);
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn spawn_upstream() -> (String, UpstreamHits) {
    let hits = UpstreamHits::default();
    let app = Router::new()
        .route("/api/series/:id", get(series))
        .route("/slow", get(slow))
        .route("/broken", get(broken))
        .with_state(hits.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), hits)
}

// == Helper Functions ==

struct TestApp {
    app: Router,
    state: AppState,
    hits: UpstreamHits,
    dir: TempDir,
}

async fn create_test_app() -> TestApp {
    let (upstream_url, hits) = spawn_upstream().await;
    let dir = TempDir::new().unwrap();
    let config = Config {
        upstream_url,
        cache_dir: dir.path().to_path_buf(),
        breaker_failure_threshold: 3,
        ..Config::default()
    };
    let state = AppState::from_config(&config).unwrap();

    TestApp {
        app: create_router(state.clone()),
        state,
        hits,
        dir,
    }
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Vec<u8>) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, method, uri, body).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

// == Proxy Tests ==

#[tokio::test]
async fn test_proxy_serves_and_caches_upstream_resource() {
    let test = create_test_app().await;

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/upstream/series/api/series/7")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );

    let (status, json) = send_json(&test.app, "GET", "/upstream/series/api/series/7", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["title"], "Series 7");

    // Second request was a cache hit
    assert_eq!(test.hits.count(), 1);

    let (_, entries) = send_json(&test.app, "GET", "/cache/entries", None).await;
    assert_eq!(entries["count"], 1);
    assert_eq!(entries["entries"][0]["key"], "series:api/series/7");
    assert_eq!(entries["entries"][0]["ttl_seconds"], 15 * 60);
}

#[tokio::test]
async fn test_concurrent_misses_reach_upstream_once() {
    let test = create_test_app().await;

    let requests = (0..5).map(|_| send(&test.app, "GET", "/upstream/home/slow", None));
    let responses = futures::future::join_all(requests).await;

    for (status, body) in responses {
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"slow body");
    }
    assert_eq!(test.hits.count(), 1);
}

#[tokio::test]
async fn test_failures_open_breaker() {
    let test = create_test_app().await;

    for _ in 0..3 {
        let (status, json) = send_json(&test.app, "GET", "/upstream/books/broken", None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(json.get("error").is_some());
    }

    // Rejected without contacting the upstream
    let (status, _) = send_json(&test.app, "GET", "/upstream/books/broken", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(test.hits.count(), 3);

    let (_, health) = send_json(&test.app, "GET", "/health", None).await;
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["upstream"], "open");

    let (_, stats) = send_json(&test.app, "GET", "/stats", None).await;
    assert_eq!(stats["breaker"]["state"], "open");
    assert_eq!(stats["cache_size"]["entries"], 0);
}

// == Cache Mode Tests ==

#[tokio::test]
async fn test_file_mode_persists_to_cache_dir() {
    let test = create_test_app().await;

    let (status, json) = send_json(
        &test.app,
        "PUT",
        "/settings/cache-mode",
        Some(r#"{"mode":"file"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["mode"], "file");

    let (status, _) = send(&test.app, "GET", "/upstream/series/api/series/1", None).await;
    assert_eq!(status, StatusCode::OK);

    let files = tokio_test::assert_ok!(std::fs::read_dir(test.dir.path()))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "entry"))
        .count();
    assert_eq!(files, 1);

    // Memory mode does not see file-mode entries
    send_json(
        &test.app,
        "PUT",
        "/settings/cache-mode",
        Some(r#"{"mode":"memory"}"#),
    )
    .await;
    let (_, entries) = send_json(&test.app, "GET", "/cache/entries", None).await;
    assert_eq!(entries["count"], 0);

    send(&test.app, "GET", "/upstream/series/api/series/1", None).await;
    assert_eq!(test.hits.count(), 2);
}

// == Invalidation Tests ==

#[tokio::test]
async fn test_invalidate_prefix_forces_refetch() {
    let test = create_test_app().await;

    send(&test.app, "GET", "/upstream/series/api/series/1", None).await;
    send(&test.app, "GET", "/upstream/series/api/series/2", None).await;
    assert_eq!(test.hits.count(), 2);

    let (status, json) = send_json(&test.app, "DELETE", "/cache/prefix/series:", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["removed"], 2);

    send(&test.app, "GET", "/upstream/series/api/series/1", None).await;
    assert_eq!(test.hits.count(), 3);
}

#[tokio::test]
async fn test_invalidate_key_and_clear() {
    let test = create_test_app().await;

    send(&test.app, "GET", "/upstream/series/api/series/1", None).await;
    send(&test.app, "GET", "/upstream/series/api/series/2", None).await;

    let (status, json) =
        send_json(&test.app, "DELETE", "/cache/key/series:api/series/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["removed"], 1);

    let (_, json) = send_json(&test.app, "DELETE", "/cache/key/series:api/series/1", None).await;
    assert_eq!(json["removed"], 0);

    let (_, json) = send_json(&test.app, "DELETE", "/cache", None).await;
    assert_eq!(json["removed"], 1);
    assert_eq!(test.state.gateway.cache().size().await.entries, 0);
}

// == Settings Tests ==

#[tokio::test]
async fn test_ttl_settings_apply_to_new_entries() {
    let test = create_test_app().await;

    let (status, json) =
        send_json(&test.app, "PUT", "/settings/ttl/series", Some(r#"{"minutes":2}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["minutes"], 2);

    let (_, ttls) = send_json(&test.app, "GET", "/settings/ttl", None).await;
    assert_eq!(ttls["ttls"]["series"], 2);
    assert_eq!(ttls["ttls"]["images"], 1440);

    send(&test.app, "GET", "/upstream/series/api/series/3", None).await;
    let (_, entries) = send_json(&test.app, "GET", "/cache/entries", None).await;
    assert_eq!(entries["entries"][0]["ttl_seconds"], 120);
}

#[tokio::test]
async fn test_max_concurrent_settings() {
    let test = create_test_app().await;

    let (status, json) = send_json(
        &test.app,
        "PUT",
        "/settings/max-concurrent",
        Some(r#"{"max_concurrent":9}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["max_concurrent"], 9);

    let (_, json) = send_json(&test.app, "GET", "/settings/max-concurrent", None).await;
    assert_eq!(json["max_concurrent"], 9);
    assert_eq!(test.state.gateway.queue().max_concurrent(), 9);

    let (status, json) = send_json(
        &test.app,
        "PUT",
        "/settings/max-concurrent",
        Some(r#"{"max_concurrent":0}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json.get("error").is_some());
}

// == Error Response Tests ==

#[tokio::test]
async fn test_invalid_json_request() {
    let test = create_test_app().await;

    let (status, _) = send(
        &test.app,
        "PUT",
        "/settings/cache-mode",
        Some(r#"{"invalid json"#),
    )
    .await;

    // Axum rejects malformed bodies before the handler runs
    assert!(status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_stats_endpoint_reports_all_components() {
    let test = create_test_app().await;

    send(&test.app, "GET", "/upstream/series/api/series/1", None).await;
    send(&test.app, "GET", "/upstream/series/api/series/1", None).await;

    let (status, stats) = send_json(&test.app, "GET", "/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["cache_mode"], "memory");
    assert_eq!(stats["cache"]["hits"], 1);
    assert_eq!(stats["cache"]["writes"], 1);
    assert_eq!(stats["queue"]["dispatched"], 1);
    assert_eq!(stats["monitor"]["active"], 0);
    assert_eq!(stats["in_flight_keys"], 0);
    assert!((stats["hit_rate"].as_f64().unwrap() - 0.5).abs() < 0.001);
}
