//! End-to-end tests for online retrieval
//!
//! Drive the engine against a real registry snapshot and an in-memory
//! store wrapped in a scripted reader that counts, delays or fails batch
//! reads per feature view.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use featline_core::{
    CallContext, CompositeKey, DataSource, Entity, EntityKey, EntityRow, Error, FeatureService,
    FeatureSpec, FeatureValue, FeatureView, FeatureViewProjection, FieldStatus,
    OnlineStoreReader, OnlineStoreWriter, RequestFeatureView, Result, StoredRow, ValueType,
};
use featline_online::InMemoryOnlineStore;
use featline_registry::{RegistryLookup, RegistrySnapshot, SnapshotRegistry};
use featline_serving::{
    EngineOptions, RetrievalEngine, RetrievalRequest, RetrievalResponse, TtlBoundary,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// =============================================================================
// Fixtures
// =============================================================================

fn request_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn driver_stats(ttl: Duration) -> FeatureView {
    FeatureView::new(
        "driver_stats",
        "rides",
        vec!["driver_id".to_string()],
        vec![
            FeatureSpec::new("conv_rate", ValueType::Float),
            FeatureSpec::new("acc_rate", ValueType::Float),
            FeatureSpec::new("trips_today", ValueType::Int64),
        ],
    )
    .unwrap()
    .with_ttl(ttl)
}

fn snapshot_with(driver_view: FeatureView, version: u64) -> RegistrySnapshot {
    let customer_profile = FeatureView::new(
        "customer_profile",
        "rides",
        vec!["customer_id".to_string()],
        vec![
            FeatureSpec::new("avg_orders", ValueType::Double),
            FeatureSpec::new("name", ValueType::String),
        ],
    )
    .unwrap();
    let pair_stats = FeatureView::new(
        "driver_customer_stats",
        "rides",
        vec!["driver_id".to_string(), "customer_id".to_string()],
        vec![FeatureSpec::new("rides_together", ValueType::Int64)],
    )
    .unwrap();
    let source = DataSource::request(
        "vals",
        vec![
            ("val_to_add".to_string(), ValueType::Int64),
            ("note".to_string(), ValueType::String),
        ],
    )
    .unwrap();

    RegistrySnapshot::builder()
        .version(version)
        .entity("rides", Entity::new("driver_id", ValueType::Int64))
        .entity("rides", Entity::new("customer_id", ValueType::String))
        .feature_view(driver_view)
        .feature_view(customer_profile)
        .feature_view(pair_stats)
        .request_feature_view(RequestFeatureView::new("vals_to_add", "rides", source).unwrap())
        .feature_service(FeatureService::new(
            "driver_ranking",
            "rides",
            vec![
                FeatureViewProjection {
                    feature_view: "driver_stats".to_string(),
                    features: vec!["conv_rate".to_string()],
                },
                FeatureViewProjection {
                    feature_view: "customer_profile".to_string(),
                    features: vec![],
                },
            ],
        ))
        .build()
        .unwrap()
}

fn snapshot() -> RegistrySnapshot {
    snapshot_with(driver_stats(Duration::from_secs(3600)), 1)
}

fn driver_key(id: i64) -> CompositeKey {
    CompositeKey::single("driver_id", id.to_string())
}

fn customer_key(id: &str) -> CompositeKey {
    CompositeKey::single("customer_id", id)
}

async fn seeded_store() -> InMemoryOnlineStore {
    let store = InMemoryOnlineStore::new();
    let t = request_time();

    store
        .write_rows(
            "rides",
            "driver_stats",
            vec![
                (
                    driver_key(1001),
                    StoredRow::new(t - ChronoDuration::minutes(5))
                        .with_feature("conv_rate", 0.5f64)
                        .with_feature("acc_rate", 0.9f64)
                        .with_feature("trips_today", 12i64),
                ),
                (
                    driver_key(1002),
                    StoredRow::new(t - ChronoDuration::minutes(30))
                        .with_feature("conv_rate", 0.25f64)
                        .with_feature("acc_rate", FeatureValue::Null),
                ),
                // exactly at the ttl
                (
                    driver_key(1003),
                    StoredRow::new(t - ChronoDuration::hours(1)).with_feature("conv_rate", 0.1f64),
                ),
                // one second past the ttl
                (
                    driver_key(1004),
                    StoredRow::new(t - ChronoDuration::hours(1) - ChronoDuration::seconds(1))
                        .with_feature("conv_rate", 0.2f64),
                ),
            ],
        )
        .await
        .unwrap();

    store
        .write_rows(
            "rides",
            "customer_profile",
            vec![(
                customer_key("c1"),
                StoredRow::new(t - ChronoDuration::days(3650))
                    .with_feature("avg_orders", 3.5f64)
                    .with_feature("name", "Ada"),
            )],
        )
        .await
        .unwrap();

    store
        .write_rows(
            "rides",
            "driver_customer_stats",
            vec![(
                CompositeKey::new(vec![
                    EntityKey::new("driver_id", "1001"),
                    EntityKey::new("customer_id", "c1"),
                ]),
                StoredRow::new(t).with_feature("rides_together", 4i64),
            )],
        )
        .await
        .unwrap();

    store
}

/// Reader that records, delays or fails batch reads per feature view
#[derive(Default)]
struct ScriptedStore {
    inner: InMemoryOnlineStore,
    delays: HashMap<String, Duration>,
    failing_view: Option<String>,
    /// (feature view, number of keys) per batch read issued
    calls: Mutex<Vec<(String, usize)>>,
    /// Feature views in the order their reads completed
    completed: Mutex<Vec<String>>,
}

impl ScriptedStore {
    async fn new() -> Self {
        Self {
            inner: seeded_store().await,
            ..Default::default()
        }
    }

    fn with_delay(mut self, view: &str, delay: Duration) -> Self {
        self.delays.insert(view.to_string(), delay);
        self
    }

    fn failing(mut self, view: &str) -> Self {
        self.failing_view = Some(view.to_string());
        self
    }

    fn calls(&self) -> Vec<(String, usize)> {
        self.calls.lock().unwrap().clone()
    }

    fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl OnlineStoreReader for ScriptedStore {
    async fn read_batch(
        &self,
        ctx: &CallContext,
        project: &str,
        feature_view: &str,
        keys: &[CompositeKey],
    ) -> Result<HashMap<CompositeKey, StoredRow>> {
        self.calls
            .lock()
            .unwrap()
            .push((feature_view.to_string(), keys.len()));

        if let Some(delay) = self.delays.get(feature_view) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing_view.as_deref() == Some(feature_view) {
            return Err(Error::store_read(feature_view, "connection refused"));
        }

        let rows = self.inner.read_batch(ctx, project, feature_view, keys).await?;
        self.completed
            .lock()
            .unwrap()
            .push(feature_view.to_string());
        Ok(rows)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "scripted"
    }
}

fn engine(store: Arc<ScriptedStore>) -> RetrievalEngine {
    let registry: Arc<dyn RegistryLookup> = Arc::new(Arc::new(snapshot()));
    RetrievalEngine::new(registry, store)
}

fn ctx() -> CallContext {
    CallContext::new().with_request_time(request_time())
}

fn row(pairs: &[(&str, FeatureValue)]) -> EntityRow {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn driver_rows(ids: &[i64]) -> Vec<EntityRow> {
    ids.iter()
        .map(|id| row(&[("driver_id", FeatureValue::Int(*id))]))
        .collect()
}

fn request(features: &[&str], rows: Vec<EntityRow>) -> RetrievalRequest {
    RetrievalRequest::new(
        "rides",
        features.iter().map(|s| s.to_string()).collect(),
        rows,
    )
}

fn statuses(response: &RetrievalResponse, feature: &str) -> Vec<FieldStatus> {
    response
        .feature(feature)
        .unwrap()
        .values
        .iter()
        .map(|c| c.status)
        .collect()
}

// =============================================================================
// Shape and deduplication
// =============================================================================

#[tokio::test]
async fn test_response_shape_follows_request() {
    let store = Arc::new(ScriptedStore::new().await);
    let engine = engine(Arc::clone(&store));

    let rows = vec![
        row(&[("driver_id", 1002i64.into()), ("customer_id", "c1".into())]),
        row(&[("driver_id", 1001i64.into()), ("customer_id", "c9".into())]),
        row(&[("driver_id", 9999i64.into()), ("customer_id", "c1".into())]),
    ];
    let req = request(
        &[
            "customer_profile:name",
            "driver_stats:conv_rate",
            "driver_stats:acc_rate",
            "customer_profile:avg_orders",
        ],
        rows,
    );

    let response = engine.get_online_features(&ctx(), &req).await.unwrap();

    assert_eq!(
        response.metadata.feature_names,
        vec!["name", "conv_rate", "acc_rate", "avg_orders"]
    );
    assert_eq!(response.results.len(), 4);
    assert!(response.results.iter().all(|v| v.values.len() == 3));

    let conv = &response.feature("conv_rate").unwrap().values;
    assert_eq!(conv[0].value, FeatureValue::Float(0.25));
    assert_eq!(conv[1].value, FeatureValue::Float(0.5));
    assert_eq!(conv[2].status, FieldStatus::NotFound);

    let names = &response.feature("name").unwrap().values;
    assert_eq!(names[0].value, FeatureValue::String("Ada".to_string()));
    assert_eq!(names[1].status, FieldStatus::NotFound);
    assert_eq!(names[2].value, FeatureValue::String("Ada".to_string()));
}

#[tokio::test]
async fn test_duplicate_rows_read_once() {
    let store = Arc::new(ScriptedStore::new().await);
    let engine = engine(Arc::clone(&store));

    let req = request(
        &["driver_stats:conv_rate", "driver_stats:trips_today"],
        driver_rows(&[1001, 1002, 1001, 1001]),
    );
    let response = engine.get_online_features(&ctx(), &req).await.unwrap();

    // one batch for the view, with the two distinct keys
    assert_eq!(store.calls(), vec![("driver_stats".to_string(), 2)]);

    for feature in ["conv_rate", "trips_today"] {
        let values = &response.feature(feature).unwrap().values;
        assert_eq!(values[0], values[2]);
        assert_eq!(values[0], values[3]);
        assert_ne!(values[0], values[1]);
    }
}

#[tokio::test]
async fn test_duplicate_references_emitted_per_occurrence() {
    let store = Arc::new(ScriptedStore::new().await);
    let engine = engine(Arc::clone(&store));

    let req = request(
        &["driver_stats:conv_rate", "driver_stats:conv_rate"],
        driver_rows(&[1001]),
    );
    let response = engine.get_online_features(&ctx(), &req).await.unwrap();

    assert_eq!(response.results.len(), 2);
    assert_eq!(response.results[0], response.results[1]);
    assert_eq!(store.calls().len(), 1);
}

#[tokio::test]
async fn test_composite_key_view() {
    let store = Arc::new(ScriptedStore::new().await);
    let engine = engine(Arc::clone(&store));

    let rows = vec![
        row(&[("customer_id", "c1".into()), ("driver_id", 1001i64.into())]),
        row(&[("driver_id", 1001i64.into()), ("customer_id", "c2".into())]),
    ];
    let req = request(&["driver_customer_stats:rides_together"], rows);
    let response = engine.get_online_features(&ctx(), &req).await.unwrap();

    assert_eq!(
        statuses(&response, "rides_together"),
        vec![FieldStatus::Present, FieldStatus::NotFound]
    );
    assert_eq!(
        response.results[0].values[0].value,
        FeatureValue::Int(4)
    );
}

// =============================================================================
// Staleness
// =============================================================================

#[tokio::test]
async fn test_ttl_boundary_is_inclusive_by_default() {
    let store = Arc::new(ScriptedStore::new().await);
    let engine = engine(Arc::clone(&store));

    let req = request(&["driver_stats:conv_rate"], driver_rows(&[1003, 1004]));
    let response = engine.get_online_features(&ctx(), &req).await.unwrap();

    let values = &response.results[0].values;
    // age == ttl
    assert_eq!(values[0].status, FieldStatus::Present);
    assert_eq!(values[0].value, FeatureValue::Float(0.1));
    // age == ttl + 1s: value withheld
    assert_eq!(values[1].status, FieldStatus::OutsideTtl);
    assert_eq!(values[1].value, FeatureValue::Null);
}

#[tokio::test]
async fn test_ttl_boundary_exclusive_option() {
    let store = Arc::new(ScriptedStore::new().await);
    let engine = engine(Arc::clone(&store)).with_options(EngineOptions {
        ttl_boundary: TtlBoundary::Exclusive,
        ..EngineOptions::default()
    });

    let req = request(&["driver_stats:conv_rate"], driver_rows(&[1003]));
    let response = engine.get_online_features(&ctx(), &req).await.unwrap();
    assert_eq!(statuses(&response, "conv_rate"), vec![FieldStatus::OutsideTtl]);
}

#[tokio::test]
async fn test_no_ttl_serves_any_age() {
    let store = Arc::new(ScriptedStore::new().await);
    let engine = engine(Arc::clone(&store));

    let rows = vec![
        row(&[("customer_id", "c1".into())]),
        row(&[("customer_id", "c404".into())]),
    ];
    let req = request(&["customer_profile:avg_orders"], rows);
    let response = engine.get_online_features(&ctx(), &req).await.unwrap();

    assert_eq!(
        statuses(&response, "avg_orders"),
        vec![FieldStatus::Present, FieldStatus::NotFound]
    );
}

#[tokio::test]
async fn test_fresh_row_with_null_feature() {
    let store = Arc::new(ScriptedStore::new().await);
    let engine = engine(Arc::clone(&store));

    // 1002 stores acc_rate as null and never wrote trips_today
    let req = request(
        &["driver_stats:acc_rate", "driver_stats:trips_today"],
        driver_rows(&[1002]),
    );
    let response = engine.get_online_features(&ctx(), &req).await.unwrap();

    assert_eq!(statuses(&response, "acc_rate"), vec![FieldStatus::NullValue]);
    assert_eq!(statuses(&response, "trips_today"), vec![FieldStatus::NullValue]);
    assert!(response.results[0].values[0].event_timestamp.is_some());
}

#[tokio::test]
async fn test_request_time_is_fixed_per_call() {
    let store = Arc::new(ScriptedStore::new().await);
    let engine = engine(Arc::clone(&store));

    // a later request time pushes 1003 out of its ttl
    let later = ctx().with_request_time(request_time() + ChronoDuration::seconds(1));
    let req = request(&["driver_stats:conv_rate"], driver_rows(&[1003]));
    let response = engine.get_online_features(&later, &req).await.unwrap();
    assert_eq!(statuses(&response, "conv_rate"), vec![FieldStatus::OutsideTtl]);
}

// =============================================================================
// Definition errors
// =============================================================================

#[tokio::test]
async fn test_unknown_reference_fails_whole_call() {
    let store = Arc::new(ScriptedStore::new().await);
    let engine = engine(Arc::clone(&store));

    let req = request(
        &["driver_stats:conv_rate", "missingview:missingfeat"],
        driver_rows(&[1001]),
    );
    let err = engine.get_online_features(&ctx(), &req).await.unwrap_err();

    assert!(matches!(err, Error::FeatureViewNotFound { .. }));
    assert!(!err.is_retryable());
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_missing_entity_key_fails() {
    let store = Arc::new(ScriptedStore::new().await);
    let engine = engine(Arc::clone(&store));

    let req = request(
        &["driver_stats:conv_rate"],
        vec![row(&[("customer_id", "c1".into())])],
    );
    let err = engine.get_online_features(&ctx(), &req).await.unwrap_err();
    assert!(matches!(err, Error::MissingEntityKey { row: 0, .. }));
}

// =============================================================================
// On-demand features
// =============================================================================

#[tokio::test]
async fn test_on_demand_passthrough_reads_nothing() {
    let store = Arc::new(ScriptedStore::new().await);
    let engine = engine(Arc::clone(&store));

    let rows = vec![
        row(&[("val_to_add", 2i64.into()), ("note", "first".into())]),
        row(&[("val_to_add", (-7i64).into()), ("note", "second".into())]),
    ];
    let req = request(&["vals_to_add:val_to_add", "vals_to_add:note"], rows);
    let response = engine.get_online_features(&ctx(), &req).await.unwrap();

    assert!(store.calls().is_empty());
    let values = &response.feature("val_to_add").unwrap().values;
    assert_eq!(values[0].value, FeatureValue::Int(2));
    assert_eq!(values[1].value, FeatureValue::Int(-7));
    assert!(values.iter().all(|c| c.status == FieldStatus::Present));
    assert_eq!(
        response.feature("note").unwrap().values[1].value,
        FeatureValue::String("second".to_string())
    );
}

#[tokio::test]
async fn test_on_demand_mixed_with_stored() {
    let store = Arc::new(ScriptedStore::new().await);
    let engine = engine(Arc::clone(&store));

    let rows = vec![row(&[
        ("driver_id", 1001i64.into()),
        ("val_to_add", 5i64.into()),
        ("note", "n".into()),
    ])];
    let req = request(&["vals_to_add:val_to_add", "driver_stats:conv_rate"], rows);
    let response = engine.get_online_features(&ctx(), &req).await.unwrap();

    assert_eq!(response.metadata.feature_names, vec!["val_to_add", "conv_rate"]);
    assert_eq!(store.calls(), vec![("driver_stats".to_string(), 1)]);
}

#[tokio::test]
async fn test_on_demand_missing_field_fails() {
    let store = Arc::new(ScriptedStore::new().await);
    let engine = engine(Arc::clone(&store));

    let req = request(
        &["vals_to_add:val_to_add"],
        vec![row(&[("val_to_add", 1i64.into())])],
    );
    let err = engine.get_online_features(&ctx(), &req).await.unwrap_err();
    assert!(matches!(err, Error::MissingRequestData { ref field, .. } if field == "note"));
}

#[tokio::test]
async fn test_on_demand_disabled() {
    let store = Arc::new(ScriptedStore::new().await);
    let engine = engine(Arc::clone(&store)).with_options(EngineOptions {
        on_demand_enabled: false,
        ..EngineOptions::default()
    });

    let req = request(
        &["vals_to_add:val_to_add"],
        vec![row(&[("val_to_add", 1i64.into()), ("note", "x".into())])],
    );
    let err = engine.get_online_features(&ctx(), &req).await.unwrap_err();
    assert!(matches!(err, Error::OnDemandDisabled(_)));
}

// =============================================================================
// Feature services
// =============================================================================

#[tokio::test]
async fn test_feature_service_with_full_names() {
    let store = Arc::new(ScriptedStore::new().await);
    let engine = engine(Arc::clone(&store));

    let req = RetrievalRequest::for_service(
        "rides",
        "driver_ranking",
        vec![row(&[("driver_id", 1001i64.into()), ("customer_id", "c1".into())])],
    )
    .with_full_feature_names(true);
    let response = engine.get_online_features(&ctx(), &req).await.unwrap();

    assert_eq!(
        response.metadata.feature_names,
        vec![
            "driver_stats__conv_rate",
            "customer_profile__avg_orders",
            "customer_profile__name"
        ]
    );
    assert_eq!(store.calls().len(), 2);
}

// =============================================================================
// Concurrency, failures and cancellation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_result_independent_of_read_completion_order() {
    let rows = vec![row(&[("driver_id", 1001i64.into()), ("customer_id", "c1".into())])];
    let req = request(&["driver_stats:conv_rate", "customer_profile:name"], rows);

    let driver_slow = Arc::new(
        ScriptedStore::new()
            .await
            .with_delay("driver_stats", Duration::from_millis(50)),
    );
    let customer_slow = Arc::new(
        ScriptedStore::new()
            .await
            .with_delay("customer_profile", Duration::from_millis(50)),
    );

    let a = engine(Arc::clone(&driver_slow))
        .get_online_features(&ctx(), &req)
        .await
        .unwrap();
    let b = engine(Arc::clone(&customer_slow))
        .get_online_features(&ctx(), &req)
        .await
        .unwrap();

    assert_eq!(driver_slow.completed(), vec!["customer_profile", "driver_stats"]);
    assert_eq!(customer_slow.completed(), vec!["driver_stats", "customer_profile"]);
    assert_eq!(a, b);
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}

#[tokio::test(start_paused = true)]
async fn test_views_are_read_concurrently() {
    let store = Arc::new(
        ScriptedStore::new()
            .await
            .with_delay("driver_stats", Duration::from_millis(100))
            .with_delay("customer_profile", Duration::from_millis(100)),
    );
    let engine = engine(Arc::clone(&store));
    let rows = vec![row(&[("driver_id", 1001i64.into()), ("customer_id", "c1".into())])];
    let req = request(&["driver_stats:conv_rate", "customer_profile:name"], rows);

    let started = tokio::time::Instant::now();
    engine.get_online_features(&ctx(), &req).await.unwrap();

    // sequential reads would take 200ms
    assert!(started.elapsed() < Duration::from_millis(150));
}

#[tokio::test]
async fn test_store_failure_fails_whole_call() {
    let store = Arc::new(ScriptedStore::new().await.failing("customer_profile"));
    let engine = engine(Arc::clone(&store));

    let rows = vec![row(&[("driver_id", 1001i64.into()), ("customer_id", "c1".into())])];
    let req = request(&["driver_stats:conv_rate", "customer_profile:name"], rows);
    let err = engine.get_online_features(&ctx(), &req).await.unwrap_err();

    assert!(matches!(err, Error::StoreReadFailed { .. }));
    assert!(err.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn test_deadline_aborts_in_flight_reads() {
    let store = Arc::new(
        ScriptedStore::new()
            .await
            .with_delay("driver_stats", Duration::from_secs(10)),
    );
    let engine = engine(Arc::clone(&store));

    let call = ctx().with_timeout(Duration::from_millis(50));
    let req = request(&["driver_stats:conv_rate"], driver_rows(&[1001]));
    let err = engine.get_online_features(&call, &req).await.unwrap_err();

    assert!(matches!(err, Error::DeadlineExceeded));
    assert_eq!(store.calls().len(), 1);
    assert!(store.completed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_aborts_in_flight_reads() {
    let store = Arc::new(
        ScriptedStore::new()
            .await
            .with_delay("driver_stats", Duration::from_secs(10)),
    );
    let engine = engine(Arc::clone(&store));

    let call = ctx();
    let canceller = call.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        canceller.cancel();
    });

    let req = request(&["driver_stats:conv_rate"], driver_rows(&[1001]));
    let err = engine.get_online_features(&call, &req).await.unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert!(store.completed().is_empty());
}

#[tokio::test]
async fn test_already_cancelled_call_reads_nothing() {
    let store = Arc::new(ScriptedStore::new().await);
    let engine = engine(Arc::clone(&store));

    let call = ctx();
    call.cancel();
    let req = request(&["driver_stats:conv_rate"], driver_rows(&[1001]));
    let err = engine.get_online_features(&call, &req).await.unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert!(store.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_call_keeps_its_registry_snapshot() {
    let store = Arc::new(
        ScriptedStore::new()
            .await
            .with_delay("driver_stats", Duration::from_millis(100)),
    );
    let registry = Arc::new(SnapshotRegistry::new(snapshot()));
    let engine = Arc::new(RetrievalEngine::new(
        registry.clone(),
        store.clone() as Arc<dyn OnlineStoreReader>,
    ));

    let req = request(&["driver_stats:conv_rate"], driver_rows(&[1004]));
    let in_flight = {
        let engine = Arc::clone(&engine);
        let req = req.clone();
        tokio::spawn(async move { engine.get_online_features(&ctx(), &req).await })
    };

    // While the read is in flight, widen the ttl to a day
    tokio::time::sleep(Duration::from_millis(10)).await;
    registry.swap(snapshot_with(driver_stats(Duration::from_secs(86400)), 2));

    let first = in_flight.await.unwrap().unwrap();
    assert_eq!(statuses(&first, "conv_rate"), vec![FieldStatus::OutsideTtl]);

    let second = engine.get_online_features(&ctx(), &req).await.unwrap();
    assert_eq!(statuses(&second, "conv_rate"), vec![FieldStatus::Present]);
}
