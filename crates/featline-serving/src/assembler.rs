//! Response assembly
//!
//! Lays the per-reference value columns out in request order. Deterministic:
//! the same inputs always produce the same response, whatever order the
//! store reads finished in.

use crate::request::FeatureReference;
use chrono::{DateTime, Utc};
use featline_core::{Error, FeatureValue, FieldStatus, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One returned value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCell {
    pub value: FeatureValue,
    pub status: FieldStatus,
    /// Event time of the stored row this value came from, if one existed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_timestamp: Option<DateTime<Utc>>,
}

impl FeatureCell {
    pub fn present(value: FeatureValue, event_timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            value,
            status: FieldStatus::Present,
            event_timestamp,
        }
    }

    pub fn null_value(event_timestamp: DateTime<Utc>) -> Self {
        Self {
            value: FeatureValue::Null,
            status: FieldStatus::NullValue,
            event_timestamp: Some(event_timestamp),
        }
    }

    pub fn not_found() -> Self {
        Self {
            value: FeatureValue::Null,
            status: FieldStatus::NotFound,
            event_timestamp: None,
        }
    }

    /// The stale value itself is withheld
    pub fn outside_ttl(event_timestamp: DateTime<Utc>) -> Self {
        Self {
            value: FeatureValue::Null,
            status: FieldStatus::OutsideTtl,
            event_timestamp: Some(event_timestamp),
        }
    }
}

/// Row-aligned values of one requested feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub name: String,
    pub values: Vec<FeatureCell>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub feature_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResponse {
    pub metadata: ResponseMetadata,
    /// One vector per requested feature, in request order
    pub results: Vec<FeatureVector>,
}

impl RetrievalResponse {
    pub fn feature(&self, name: &str) -> Option<&FeatureVector> {
        self.results.iter().find(|v| v.name == name)
    }

    pub fn num_rows(&self) -> usize {
        self.results.first().map(|v| v.values.len()).unwrap_or(0)
    }

    /// Count of returned values per status
    pub fn status_counts(&self) -> BTreeMap<&'static str, u64> {
        let mut counts = BTreeMap::new();
        for cell in self.results.iter().flat_map(|v| &v.values) {
            *counts.entry(cell.status.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

/// Value columns keyed by reference, each already row-aligned
pub type FeatureColumns = HashMap<FeatureReference, Vec<FeatureCell>>;

pub fn assemble(
    references: &[FeatureReference],
    full_feature_names: bool,
    columns: &FeatureColumns,
) -> Result<RetrievalResponse> {
    let mut results = Vec::with_capacity(references.len());
    for reference in references {
        let values = columns.get(reference).ok_or_else(|| {
            Error::internal(format!("no values retrieved for '{}'", reference))
        })?;
        results.push(FeatureVector {
            name: reference.output_name(full_feature_names),
            values: values.clone(),
        });
    }

    let feature_names = results.iter().map(|v| v.name.clone()).collect();
    Ok(RetrievalResponse {
        metadata: ResponseMetadata { feature_names },
        results,
    })
}
