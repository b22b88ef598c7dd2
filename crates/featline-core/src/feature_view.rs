//! Schema model: entities, feature views, request feature views and
//! feature services
//!
//! These are immutable snapshots. A new definition replaces an old one
//! wholesale in the registry; nothing here is mutated in place once
//! published, except `FeatureViewMeta`'s append-only interval list.

use crate::data_source::{DataSource, SourceType};
use crate::error::{Error, Result};
use crate::types::{duration_secs, ValueType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// A named join key, e.g. "driver_id"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,

    #[serde(default = "default_entity_type")]
    pub value_type: ValueType,

    #[serde(default)]
    pub description: Option<String>,
}

fn default_entity_type() -> ValueType {
    ValueType::String
}

impl Entity {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            description: None,
        }
    }
}

/// One feature column within a view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub value_type: ValueType,
}

impl FeatureSpec {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }
}

/// A named group of materialized features sharing entities, sources and a
/// staleness policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureView {
    pub name: String,

    /// Owning project; may be left empty in definition files and filled in
    /// from the file-level project
    #[serde(default)]
    pub project: String,

    /// Entity names; a composite key when there is more than one
    pub entities: Vec<String>,

    pub features: Vec<FeatureSpec>,

    /// Maximum value age for serving; `None` means never stale
    #[serde(default, with = "duration_secs", rename = "ttl_seconds")]
    pub ttl: Option<Duration>,

    #[serde(default)]
    pub batch_source: Option<DataSource>,

    #[serde(default)]
    pub stream_source: Option<DataSource>,

    #[serde(default = "default_online")]
    pub online: bool,

    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub owner: Option<String>,
}

fn default_online() -> bool {
    true
}

impl FeatureView {
    /// Creates an online-enabled view with no ttl and no sources
    pub fn new(
        name: impl Into<String>,
        project: impl Into<String>,
        entities: Vec<String>,
        features: Vec<FeatureSpec>,
    ) -> Result<Self> {
        let view = Self {
            name: name.into(),
            project: project.into(),
            entities,
            features,
            ttl: None,
            batch_source: None,
            stream_source: None,
            online: true,
            tags: BTreeMap::new(),
            description: None,
            owner: None,
        };
        view.validate()?;
        Ok(view)
    }

    /// Sets the ttl. A zero duration means "no ttl".
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = (!ttl.is_zero()).then_some(ttl);
        self
    }

    pub fn with_batch_source(mut self, source: DataSource) -> Self {
        self.batch_source = Some(source);
        self
    }

    pub fn with_stream_source(mut self, source: DataSource) -> Self {
        self.stream_source = Some(source);
        self
    }

    pub fn with_online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Checks structural invariants
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid_definition("feature view name must not be empty"));
        }
        if self.entities.is_empty() {
            return Err(Error::invalid_definition(format!(
                "feature view '{}' must declare at least one entity",
                self.name
            )));
        }
        let mut seen = HashSet::new();
        for entity in &self.entities {
            if !seen.insert(entity.as_str()) {
                return Err(Error::invalid_definition(format!(
                    "feature view '{}' lists entity '{}' twice",
                    self.name, entity
                )));
            }
        }
        let mut seen = HashSet::new();
        for feature in &self.features {
            if !seen.insert(feature.name.as_str()) {
                return Err(Error::invalid_definition(format!(
                    "feature view '{}' defines feature '{}' twice",
                    self.name, feature.name
                )));
            }
        }
        for source in [&self.batch_source, &self.stream_source].into_iter().flatten() {
            if source.source_type() == SourceType::RequestData {
                return Err(Error::invalid_definition(format!(
                    "feature view '{}' cannot be backed by a request data source",
                    self.name
                )));
            }
        }
        Ok(())
    }

    pub fn feature(&self, name: &str) -> Option<&FeatureSpec> {
        self.features.iter().find(|f| f.name == name)
    }

    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|f| f.name.as_str())
    }

    /// Entity names in canonical (sorted) order, the order used for keys
    pub fn canonical_entities(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entities.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// A feature view whose values are supplied by the caller on every call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFeatureView {
    pub name: String,

    /// Owning project; may be left empty in definition files and filled in
    /// from the file-level project
    #[serde(default)]
    pub project: String,

    pub request_data_source: DataSource,

    #[serde(default)]
    pub description: Option<String>,
}

impl RequestFeatureView {
    pub fn new(
        name: impl Into<String>,
        project: impl Into<String>,
        request_data_source: DataSource,
    ) -> Result<Self> {
        let view = Self {
            name: name.into(),
            project: project.into(),
            request_data_source,
            description: None,
        };
        view.validate()?;
        Ok(view)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid_definition(
                "request feature view name must not be empty",
            ));
        }
        if self.request_data_source.request_schema().is_none() {
            return Err(Error::invalid_definition(format!(
                "request feature view '{}' requires a request data source, got '{}'",
                self.name,
                self.request_data_source.source_type()
            )));
        }
        Ok(())
    }

    /// Field name -> declared type. Each field is also a feature of the view.
    pub fn schema(&self) -> &BTreeMap<String, ValueType> {
        static EMPTY: BTreeMap<String, ValueType> = BTreeMap::new();
        self.request_data_source.request_schema().unwrap_or(&EMPTY)
    }
}

/// Half-open time range `[start_time, end_time)` already backfilled into the
/// online store. The registry persists bounds at millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializationInterval {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl MaterializationInterval {
    pub fn new(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Result<Self> {
        if end_time < start_time {
            return Err(Error::invalid_input(format!(
                "materialization interval ends ({}) before it starts ({})",
                end_time, start_time
            )));
        }
        Ok(Self {
            start_time,
            end_time,
        })
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start_time <= ts && ts < self.end_time
    }
}

/// System bookkeeping for a feature view. Diagnostic only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureViewMeta {
    pub created_timestamp: DateTime<Utc>,
    pub last_updated_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub materialization_intervals: Vec<MaterializationInterval>,
}

impl FeatureViewMeta {
    pub fn new(created_timestamp: DateTime<Utc>) -> Self {
        Self {
            created_timestamp,
            last_updated_timestamp: created_timestamp,
            materialization_intervals: Vec::new(),
        }
    }

    /// Appends an interval; existing intervals are never rewritten
    pub fn append_interval(&mut self, interval: MaterializationInterval) {
        self.materialization_intervals.push(interval);
    }

    /// Latest end time across all intervals
    pub fn latest_materialized(&self) -> Option<DateTime<Utc>> {
        self.materialization_intervals
            .iter()
            .map(|i| i.end_time)
            .max()
    }

    pub fn covers(&self, ts: DateTime<Utc>) -> bool {
        self.materialization_intervals.iter().any(|i| i.contains(ts))
    }
}

/// Selection of features from one view inside a feature service.
/// An empty `features` list selects every feature of the view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureViewProjection {
    pub feature_view: String,
    #[serde(default)]
    pub features: Vec<String>,
}

/// A named group of feature references
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureService {
    pub name: String,
    #[serde(default)]
    pub project: String,
    pub projections: Vec<FeatureViewProjection>,
    #[serde(default)]
    pub description: Option<String>,
}

impl FeatureService {
    pub fn new(
        name: impl Into<String>,
        project: impl Into<String>,
        projections: Vec<FeatureViewProjection>,
    ) -> Self {
        Self {
            name: name.into(),
            project: project.into(),
            projections,
            description: None,
        }
    }
}
