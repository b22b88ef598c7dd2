//! End-to-end tests for the REST API
//!
//! Drive the full router (middleware included) with `tower::ServiceExt::oneshot`
//! against an in-memory registry and online store.
//!
//! ## Test Coverage
//!
//! - Health, info and metrics endpoints
//! - Online retrieval: statuses, ordering, feature services
//! - Error mapping: 400 / 404 / 503 / 504 with JSON error bodies
//! - Shutdown cancelling calls

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration as ChronoDuration, Utc};
use featline_core::{
    CallContext, CompositeKey, Entity, Error, FeatureService, FeatureSpec, FeatureView,
    FeatureViewProjection, OnlineStoreReader, OnlineStoreWriter, Result, StoredRow, ValueType,
};
use featline_online::InMemoryOnlineStore;
use featline_registry::{FeatureRegistry, RegistryDefinitions};
use featline_serving::RetrievalEngine;
use featline_server::{router, state::AppState};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

const MAX_BODY: usize = 1024 * 1024;

// =============================================================================
// Fixtures
// =============================================================================

fn definitions() -> RegistryDefinitions {
    let mut defs = RegistryDefinitions::new("rides");
    defs.entities.push(Entity::new("driver_id", ValueType::Int64));
    defs.feature_views.push(
        FeatureView::new(
            "driver_stats",
            "rides",
            vec!["driver_id".to_string()],
            vec![
                FeatureSpec::new("conv_rate", ValueType::Float),
                FeatureSpec::new("acc_rate", ValueType::Float),
            ],
        )
        .unwrap()
        .with_ttl(Duration::from_secs(3600)),
    );
    defs.feature_services.push(FeatureService::new(
        "driver_ranking",
        "rides",
        vec![FeatureViewProjection {
            feature_view: "driver_stats".to_string(),
            features: vec!["conv_rate".to_string()],
        }],
    ));
    defs
}

async fn registry() -> FeatureRegistry {
    let registry = FeatureRegistry::in_memory().await.unwrap();
    registry.apply(definitions()).await.unwrap();
    registry
}

async fn seeded_store() -> InMemoryOnlineStore {
    let store = InMemoryOnlineStore::new();
    let now = Utc::now();
    store
        .write_rows(
            "rides",
            "driver_stats",
            vec![
                (
                    CompositeKey::single("driver_id", "1001"),
                    StoredRow::new(now - ChronoDuration::minutes(5))
                        .with_feature("conv_rate", 0.5f64)
                        .with_feature("acc_rate", 0.9f64),
                ),
                (
                    CompositeKey::single("driver_id", "1002"),
                    StoredRow::new(now - ChronoDuration::days(2))
                        .with_feature("conv_rate", 0.25f64),
                ),
            ],
        )
        .await
        .unwrap();
    store
}

/// Reader that fails, or stalls, every call
struct BrokenStore {
    delay: Option<Duration>,
}

#[async_trait]
impl OnlineStoreReader for BrokenStore {
    async fn read_batch(
        &self,
        _ctx: &CallContext,
        _project: &str,
        feature_view: &str,
        _keys: &[CompositeKey],
    ) -> Result<HashMap<CompositeKey, StoredRow>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Err(Error::store_read(feature_view, "connection reset by peer"))
    }

    async fn health_check(&self) -> Result<()> {
        Err(Error::StorageError(anyhow::anyhow!("PING failed")))
    }

    fn store_type(&self) -> &'static str {
        "broken"
    }
}

async fn app_with(
    store: Arc<dyn OnlineStoreReader>,
    timeout: Duration,
    shutdown: CancellationToken,
) -> Router {
    let registry = registry().await;
    let engine = RetrievalEngine::new(registry.lookup(), store);
    router(AppState::new(engine, timeout, shutdown), MAX_BODY)
}

async fn create_test_app() -> Router {
    app_with(
        Arc::new(seeded_store().await),
        Duration::from_secs(5),
        CancellationToken::new(),
    )
    .await
}

async fn send_request(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request = match body {
        Some(body) => Request::builder()
            .uri(uri)
            .method(method)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => Request::builder()
            .uri(uri)
            .method(method)
            .body(Body::empty())
            .unwrap(),
    };
    send(app, request).await
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = ServiceExt::<Request<Body>>::oneshot(app.clone(), request)
        .await
        .unwrap();
    let status = response.status();

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json_response: Value = if body_bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&body_bytes)
            .unwrap_or_else(|_| json!({"raw": String::from_utf8_lossy(&body_bytes)}))
    };

    (status, json_response)
}

fn online_request(features: &[&str], driver_ids: &[i64]) -> Value {
    let rows: Vec<Value> = driver_ids.iter().map(|id| json!({"driver_id": id})).collect();
    json!({
        "project": "rides",
        "entity_rows": rows,
        "features": features,
    })
}

// =============================================================================
// Health, info, metrics
// =============================================================================

#[tokio::test]
async fn test_e2e_health_check() {
    // Given: A server over a healthy store
    let app = create_test_app().await;

    // When: Health check is called
    let (status, body) = send_request(&app, "GET", "/health", None).await;

    // Then: Should report the store and the registry version
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["online_store"]["type"], "memory");
    assert_eq!(body["online_store"]["healthy"], true);
    assert!(body["registry_version"].as_u64().unwrap() > 0);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_e2e_health_degraded_when_store_down() {
    // Given: A server whose store fails its health check
    let app = app_with(
        Arc::new(BrokenStore { delay: None }),
        Duration::from_secs(5),
        CancellationToken::new(),
    )
    .await;

    // When / Then: Health check reports 503
    let (status, body) = send_request(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["online_store"]["healthy"], false);
    assert!(body["online_store"]["message"]
        .as_str()
        .unwrap()
        .contains("PING failed"));
}

#[tokio::test]
async fn test_e2e_info() {
    let app = create_test_app().await;

    let (status, body) = send_request(&app, "GET", "/v1/info", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_e2e_metrics_after_retrieval() {
    // Given: One successful retrieval call
    let app = create_test_app().await;
    let (status, _) = send_request(
        &app,
        "POST",
        "/v1/features/online",
        Some(online_request(&["driver_stats:conv_rate"], &[1001, 9999])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // When: Metrics are scraped
    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;

    // Then: Prometheus text with the retrieval metrics
    assert_eq!(status, StatusCode::OK);
    let text = body["raw"].as_str().unwrap();
    assert!(text.contains("# TYPE"));
    assert!(text.contains("featline_online_requests_total"));
    assert!(text.contains("featline_online_request_duration_seconds"));
    assert!(text.contains("featline_feature_values_total"));
    assert!(text.contains("status=\"NOT_FOUND\""));
    assert!(text.contains("featline_http_requests_total"));
    assert!(text.contains("/v1/features/online"));
}

// =============================================================================
// Online retrieval
// =============================================================================

#[tokio::test]
async fn test_e2e_online_features() {
    // Given: Rows for a fresh driver, a stale driver and an unknown driver
    let app = create_test_app().await;

    // When: Two features are requested
    let (status, body) = send_request(
        &app,
        "POST",
        "/v1/features/online",
        Some(online_request(
            &["driver_stats:acc_rate", "driver_stats:conv_rate"],
            &[1001, 1002, 9999],
        )),
    )
    .await;

    // Then: One vector per feature, aligned with the rows
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["feature_names"], json!(["acc_rate", "conv_rate"]));

    let conv = &body["results"][1]["values"];
    assert_eq!(conv[0]["value"], 0.5);
    assert_eq!(conv[0]["status"], "PRESENT");
    assert!(conv[0]["event_timestamp"].is_string());
    assert_eq!(conv[1]["status"], "OUTSIDE_TTL");
    assert_eq!(conv[1]["value"], Value::Null);
    assert_eq!(conv[2]["status"], "NOT_FOUND");
    assert!(conv[2].get("event_timestamp").is_none());

    assert_eq!(body["results"][0]["values"][0]["value"], 0.9);
}

#[tokio::test]
async fn test_e2e_feature_service_with_full_names() {
    let app = create_test_app().await;

    let (status, body) = send_request(
        &app,
        "POST",
        "/v1/features/online",
        Some(json!({
            "project": "rides",
            "entity_rows": [{"driver_id": 1001}],
            "feature_service": "driver_ranking",
            "full_feature_names": true
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["metadata"]["feature_names"],
        json!(["driver_stats__conv_rate"])
    );
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_e2e_unknown_reference_is_404() {
    let app = create_test_app().await;

    let (status, body) = send_request(
        &app,
        "POST",
        "/v1/features/online",
        Some(online_request(
            &["driver_stats:conv_rate", "missingview:missingfeat"],
            &[1001],
        )),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "FEATURE_VIEW_NOT_FOUND");
    assert!(body.get("results").is_none());
}

#[tokio::test]
async fn test_e2e_missing_entity_key_is_400() {
    let app = create_test_app().await;

    let (status, body) = send_request(
        &app,
        "POST",
        "/v1/features/online",
        Some(json!({
            "project": "rides",
            "entity_rows": [{"customer_id": "c1"}],
            "features": ["driver_stats:conv_rate"]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "MISSING_ENTITY_KEY");
}

#[tokio::test]
async fn test_e2e_malformed_body_is_400() {
    let app = create_test_app().await;

    let request = Request::builder()
        .uri("/v1/features/online")
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from("{\"project\": "))
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_e2e_features_and_service_together_is_400() {
    let app = create_test_app().await;

    let (status, body) = send_request(
        &app,
        "POST",
        "/v1/features/online",
        Some(json!({
            "project": "rides",
            "entity_rows": [{"driver_id": 1001}],
            "features": ["driver_stats:conv_rate"],
            "feature_service": "driver_ranking"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_e2e_store_failure_is_503() {
    // Given: A store that fails every read
    let app = app_with(
        Arc::new(BrokenStore { delay: None }),
        Duration::from_secs(5),
        CancellationToken::new(),
    )
    .await;

    // When: Features are requested
    let (status, body) = send_request(
        &app,
        "POST",
        "/v1/features/online",
        Some(online_request(&["driver_stats:conv_rate"], &[1001])),
    )
    .await;

    // Then: Retryable service error, not NOT_FOUND values
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "STORE_UNAVAILABLE");
    assert!(body.get("results").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_e2e_deadline_is_504() {
    // Given: A store slower than the request timeout
    let app = app_with(
        Arc::new(BrokenStore {
            delay: Some(Duration::from_secs(60)),
        }),
        Duration::from_millis(100),
        CancellationToken::new(),
    )
    .await;

    // When: Features are requested
    let (status, body) = send_request(
        &app,
        "POST",
        "/v1/features/online",
        Some(online_request(&["driver_stats:conv_rate"], &[1001])),
    )
    .await;

    // Then: The call gives up at its deadline
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["error"]["code"], "DEADLINE_EXCEEDED");
}

#[tokio::test]
async fn test_e2e_shutdown_cancels_calls() {
    // Given: A server whose shutdown token has fired
    let shutdown = CancellationToken::new();
    let app = app_with(
        Arc::new(seeded_store().await),
        Duration::from_secs(5),
        shutdown.clone(),
    )
    .await;
    shutdown.cancel();

    // When: Features are requested
    let (status, body) = send_request(
        &app,
        "POST",
        "/v1/features/online",
        Some(online_request(&["driver_stats:conv_rate"], &[1001])),
    )
    .await;

    // Then: The call is cancelled rather than served
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "CANCELLED");
}

#[tokio::test]
async fn test_e2e_publish_visible_to_next_call() {
    // Given: A server sharing its registry with a publisher
    let registry = Arc::new(registry().await);
    let engine = RetrievalEngine::new(registry.lookup(), Arc::new(seeded_store().await));
    let app = router(
        AppState::new(engine, Duration::from_secs(5), CancellationToken::new()),
        MAX_BODY,
    );

    // When: A new feature view is published
    let mut defs = RegistryDefinitions::new("rides");
    defs.feature_views.push(
        FeatureView::new(
            "driver_daily",
            "rides",
            vec!["driver_id".to_string()],
            vec![FeatureSpec::new("trips", ValueType::Int64)],
        )
        .unwrap(),
    );
    registry.apply(defs).await.unwrap();

    // Then: The next call resolves it
    let (status, body) = send_request(
        &app,
        "POST",
        "/v1/features/online",
        Some(online_request(&["driver_daily:trips"], &[1001])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["values"][0]["status"], "NOT_FOUND");
}
