//! Retrieval request model

use featline_core::{EntityRow, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// `"<feature_view>:<feature>"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureReference {
    pub feature_view: String,
    pub feature: String,
}

impl FeatureReference {
    pub fn new(feature_view: impl Into<String>, feature: impl Into<String>) -> Self {
        Self {
            feature_view: feature_view.into(),
            feature: feature.into(),
        }
    }

    /// Output column name: `feature`, or `view__feature` when full names are
    /// requested
    pub fn output_name(&self, full_feature_names: bool) -> String {
        if full_feature_names {
            format!("{}__{}", self.feature_view, self.feature)
        } else {
            self.feature.clone()
        }
    }
}

impl FromStr for FeatureReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((view, feature))
                if !view.is_empty() && !feature.is_empty() && !feature.contains(':') =>
            {
                Ok(Self::new(view, feature))
            }
            _ => Err(Error::InvalidFeatureReference(s.to_string())),
        }
    }
}

impl fmt::Display for FeatureReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.feature_view, self.feature)
    }
}

/// What the caller asked for: explicit references or a named feature service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSelection {
    Features(Vec<String>),
    FeatureService(String),
}

/// One retrieval call
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalRequest {
    pub project: String,

    /// Join keys and request-data fields, one map per row
    pub entity_rows: Vec<EntityRow>,

    pub features: FeatureSelection,

    /// Name output columns `view__feature` instead of `feature`
    pub full_feature_names: bool,
}

impl RetrievalRequest {
    pub fn new(
        project: impl Into<String>,
        features: Vec<String>,
        entity_rows: Vec<EntityRow>,
    ) -> Self {
        Self {
            project: project.into(),
            entity_rows,
            features: FeatureSelection::Features(features),
            full_feature_names: false,
        }
    }

    pub fn for_service(
        project: impl Into<String>,
        service: impl Into<String>,
        entity_rows: Vec<EntityRow>,
    ) -> Self {
        Self {
            project: project.into(),
            entity_rows,
            features: FeatureSelection::FeatureService(service.into()),
            full_feature_names: false,
        }
    }

    pub fn with_full_feature_names(mut self, full: bool) -> Self {
        self.full_feature_names = full;
        self
    }
}
