//! Online retrieval engine
//!
//! One call:
//! 1. capture a registry snapshot and resolve references against it
//! 2. build one composite key per row for each view, deduplicated
//! 3. read each view's unique keys in one batch, all views concurrently,
//!    under the call's deadline and cancellation token
//! 4. evaluate ttl against the call's fixed request time
//! 5. pass caller-supplied request data through for request feature views
//! 6. replay per-row keys and assemble in request order
//!
//! The engine keeps no state between calls; every call reads the store.

use crate::assembler::{assemble, FeatureCell, FeatureColumns, RetrievalResponse};
use crate::request::{FeatureReference, RetrievalRequest};
use crate::resolver::{composite_key, ReferenceResolver, StoredViewRequest};
use chrono::{DateTime, Utc};
use featline_core::{CallContext, CompositeKey, EntityRow, OnlineStoreReader, Result, StoredRow};
use featline_registry::RegistryLookup;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Whether a value exactly `ttl` old is still served
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtlBoundary {
    /// `age <= ttl` is fresh
    #[default]
    Inclusive,
    /// `age < ttl` is fresh
    Exclusive,
}

impl TtlBoundary {
    pub fn is_fresh(self, age: chrono::Duration, ttl: chrono::Duration) -> bool {
        match self {
            Self::Inclusive => age <= ttl,
            Self::Exclusive => age < ttl,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub ttl_boundary: TtlBoundary,
    /// Serve request feature views
    pub on_demand_enabled: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            ttl_boundary: TtlBoundary::Inclusive,
            on_demand_enabled: true,
        }
    }
}

/// Status and value of one feature for one stored row (or its absence)
pub fn evaluate(
    row: Option<&StoredRow>,
    feature: &str,
    ttl: Option<Duration>,
    request_time: DateTime<Utc>,
    boundary: TtlBoundary,
) -> FeatureCell {
    let Some(row) = row else {
        return FeatureCell::not_found();
    };

    // A ttl too large for chrono can never expire.
    if let Some(ttl) = ttl.and_then(|t| chrono::Duration::from_std(t).ok()) {
        let age = request_time.signed_duration_since(row.event_timestamp);
        if !boundary.is_fresh(age, ttl) {
            return FeatureCell::outside_ttl(row.event_timestamp);
        }
    }

    match row.get_feature(feature) {
        Some(value) if !value.is_null() => {
            FeatureCell::present(value.clone(), Some(row.event_timestamp))
        }
        _ => FeatureCell::null_value(row.event_timestamp),
    }
}

/// Keys of one view: one per request row, plus the distinct ones to read
struct ViewFetchPlan<'a> {
    request: &'a StoredViewRequest,
    row_keys: Vec<CompositeKey>,
    unique_keys: Vec<CompositeKey>,
}

impl<'a> ViewFetchPlan<'a> {
    fn new(request: &'a StoredViewRequest, rows: &[EntityRow]) -> Result<Self> {
        let entities = &request.view.entities;
        let mut row_keys = Vec::with_capacity(rows.len());
        let mut unique_keys = Vec::new();
        let mut seen = HashSet::new();

        for (i, row) in rows.iter().enumerate() {
            let key = composite_key(row, i, entities)?;
            if seen.insert(key.clone()) {
                unique_keys.push(key.clone());
            }
            row_keys.push(key);
        }

        Ok(Self {
            request,
            row_keys,
            unique_keys,
        })
    }
}

pub struct RetrievalEngine {
    registry: Arc<dyn RegistryLookup>,
    store: Arc<dyn OnlineStoreReader>,
    options: EngineOptions,
}

impl RetrievalEngine {
    pub fn new(registry: Arc<dyn RegistryLookup>, store: Arc<dyn OnlineStoreReader>) -> Self {
        Self {
            registry,
            store,
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    pub fn store(&self) -> &Arc<dyn OnlineStoreReader> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<dyn RegistryLookup> {
        &self.registry
    }

    /// Runs one retrieval call.
    ///
    /// Fails as a whole on the first definition or store error, or when
    /// `ctx` is cancelled or its deadline passes; never returns a partial
    /// response.
    pub async fn get_online_features(
        &self,
        ctx: &CallContext,
        request: &RetrievalRequest,
    ) -> Result<RetrievalResponse> {
        let started = Instant::now();
        ctx.check()?;

        let snapshot = self.registry.snapshot();
        let resolved =
            ReferenceResolver::new(&snapshot, self.options.on_demand_enabled).resolve(request)?;

        let plans = resolved
            .stored
            .iter()
            .map(|view| ViewFetchPlan::new(view, &request.entity_rows))
            .collect::<Result<Vec<_>>>()?;

        let fetched = self.fetch(ctx, &request.project, &plans).await?;

        let request_time = ctx.request_time();
        let mut columns = FeatureColumns::new();
        for (plan, rows) in plans.iter().zip(&fetched) {
            let view = &plan.request.view;
            for feature in &plan.request.features {
                let cells = plan
                    .row_keys
                    .iter()
                    .map(|key| {
                        evaluate(
                            rows.get(key),
                            feature,
                            view.ttl,
                            request_time,
                            self.options.ttl_boundary,
                        )
                    })
                    .collect();
                columns.insert(FeatureReference::new(&view.name, feature), cells);
            }
        }

        for on_demand in &resolved.on_demand {
            for feature in &on_demand.features {
                let cells = request
                    .entity_rows
                    .iter()
                    .map(|row| {
                        let value = row.get(feature).cloned().unwrap_or_default();
                        FeatureCell::present(value, None)
                    })
                    .collect();
                columns.insert(FeatureReference::new(&on_demand.view.name, feature), cells);
            }
        }

        let response = assemble(&resolved.references, request.full_feature_names, &columns)?;

        debug!(
            project = %request.project,
            registry_version = snapshot.version(),
            rows = request.entity_rows.len(),
            features = resolved.references.len(),
            views = plans.len(),
            keys = plans.iter().map(|p| p.unique_keys.len()).sum::<usize>(),
            latency_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Served online features"
        );
        Ok(response)
    }

    /// One batch read per view, all in flight together. Results line up
    /// with `plans`.
    async fn fetch(
        &self,
        ctx: &CallContext,
        project: &str,
        plans: &[ViewFetchPlan<'_>],
    ) -> Result<Vec<HashMap<CompositeKey, StoredRow>>> {
        let store = &self.store;
        let reads = plans.iter().map(|plan| async move {
            if plan.unique_keys.is_empty() {
                return Ok(HashMap::new());
            }
            store
                .read_batch(ctx, project, &plan.request.view.name, &plan.unique_keys)
                .await
        });

        ctx.run(try_join_all(reads)).await
    }
}
