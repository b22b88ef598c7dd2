//! Online store contract for low-latency feature serving
//!
//! The online store holds the latest materialized row per
//! (entity key, feature view). This crate only defines how it is read (and,
//! for the upstream writer and tests, written); backends live in
//! `featline-online`.
//!
//! ## Key Format
//!
//! `{project}:{feature_view}:{key1_name}={key1_value}:{key2_name}={key2_value}`
//!
//! Entity names are sorted, so a composite key renders identically however
//! the caller ordered its row. `%`, `:` and `=` inside any component are
//! percent-encoded, so distinct keys never share a storage key.

use crate::context::CallContext;
use crate::types::{EntityKey, FeatureValue};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Join key for one entity instance of a feature view: the row's values for
/// the view's entities, in canonical (name-sorted) order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompositeKey(Vec<EntityKey>);

impl CompositeKey {
    pub fn new(mut keys: Vec<EntityKey>) -> Self {
        keys.sort();
        Self(keys)
    }

    pub fn single(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self(vec![EntityKey::new(name, value)])
    }

    pub fn entities(&self) -> &[EntityKey] {
        &self.0
    }

    /// Storage key for this entity within `project`/`feature_view`
    pub fn to_online_key(&self, project: &str, feature_view: &str) -> String {
        build_online_key(project, feature_view, &self.0)
    }
}

/// Last-written row for one composite key of a feature view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    /// Feature name -> value. A feature may be missing if it was never written.
    pub features: HashMap<String, FeatureValue>,

    /// Event time of the materialized values
    pub event_timestamp: DateTime<Utc>,
}

impl StoredRow {
    pub fn new(event_timestamp: DateTime<Utc>) -> Self {
        Self {
            features: HashMap::new(),
            event_timestamp,
        }
    }

    /// Adds a feature (builder pattern)
    pub fn with_feature(mut self, name: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.features.insert(name.into(), value.into());
        self
    }

    pub fn get_feature(&self, name: &str) -> Option<&FeatureValue> {
        self.features.get(name)
    }
}

/// Read contract for online stores
///
/// ## Implementation Requirements
///
/// - One batched round-trip per call where the backend allows it
/// - Keys with no row are simply absent from the returned map; absence is not
///   an error
/// - Backend failures are errors, never silently mapped to absence
/// - Honour `ctx`: return `Cancelled`/`DeadlineExceeded` once it fires
/// - Thread-safe (Send + Sync); called concurrently for different views
#[async_trait]
pub trait OnlineStoreReader: Send + Sync {
    /// Reads the last-written row for each key of one feature view
    async fn read_batch(
        &self,
        ctx: &CallContext,
        project: &str,
        feature_view: &str,
        keys: &[CompositeKey],
    ) -> Result<HashMap<CompositeKey, StoredRow>>;

    /// Returns Ok(()) if the store is ready to serve reads
    async fn health_check(&self) -> Result<()>;

    /// Name of this store type (for logging/metrics)
    fn store_type(&self) -> &'static str;
}

/// Write contract used by the upstream materializer and by tests.
/// The retrieval path never writes.
#[async_trait]
pub trait OnlineStoreWriter: Send + Sync {
    /// Upserts rows; a row replaces whatever was stored for its key
    async fn write_rows(
        &self,
        project: &str,
        feature_view: &str,
        rows: Vec<(CompositeKey, StoredRow)>,
    ) -> Result<()>;

    async fn delete_keys(
        &self,
        project: &str,
        feature_view: &str,
        keys: &[CompositeKey],
    ) -> Result<()>;
}

/// Builds a storage key from entity keys, sorting them by name
pub fn build_online_key(project: &str, feature_view: &str, entity_keys: &[EntityKey]) -> String {
    let mut parts = Vec::with_capacity(entity_keys.len() + 2);
    parts.push(escape(project));
    parts.push(escape(feature_view));

    let mut sorted_keys: Vec<_> = entity_keys.iter().collect();
    sorted_keys.sort_by_key(|k| &k.name);

    for key in sorted_keys {
        parts.push(format!("{}={}", escape(&key.name), escape(&key.value)));
    }

    parts.join(":")
}

/// Reverse of `build_online_key`. Returns (project, feature_view, key).
pub fn parse_online_key(key: &str) -> Option<(String, String, CompositeKey)> {
    let mut parts = key.split(':');
    let project = unescape(parts.next()?)?;
    let feature_view = unescape(parts.next()?)?;

    let mut entity_keys = Vec::new();
    for part in parts {
        let (name, value) = part.split_once('=')?;
        entity_keys.push(EntityKey::new(unescape(name)?, unescape(value)?));
    }

    Some((project, feature_view, CompositeKey::new(entity_keys)))
}

/// Percent-encodes the key separators so every component stays one segment
fn escape(component: &str) -> String {
    let mut out = String::with_capacity(component.len());
    for c in component.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            '=' => out.push_str("%3D"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(component: &str) -> Option<String> {
    let mut out = String::with_capacity(component.len());
    let mut rest = component;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let decoded = match rest.get(pos + 1..pos + 3)? {
            "25" => '%',
            "3A" => ':',
            "3D" => '=',
            _ => return None,
        };
        out.push(decoded);
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    Some(out)
}
