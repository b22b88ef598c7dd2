//! Definition files applied with `featline apply`
//!
//! ```yaml
//! project: rides
//! entities:
//!   - name: driver_id
//!     value_type: INT64
//! feature_views:
//!   - name: driver_hourly_stats
//!     entities: [driver_id]
//!     features:
//!       - name: conv_rate
//!         value_type: FLOAT
//!     ttl_seconds: 86400
//! ```
//!
//! Definitions without their own `project` inherit the file-level one.

use featline_core::{Entity, Error, FeatureService, FeatureView, RequestFeatureView, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryDefinitions {
    pub project: String,

    #[serde(default)]
    pub entities: Vec<Entity>,

    #[serde(default)]
    pub feature_views: Vec<FeatureView>,

    #[serde(default)]
    pub request_feature_views: Vec<RequestFeatureView>,

    #[serde(default)]
    pub feature_services: Vec<FeatureService>,
}

impl RegistryDefinitions {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            ..Default::default()
        }
    }

    /// Fills in missing projects and validates every definition
    pub fn normalize(mut self) -> Result<Self> {
        if self.project.trim().is_empty() {
            return Err(Error::invalid_definition(
                "definitions must name a project",
            ));
        }

        let project = self.project.clone();
        let fill = |p: &mut String| {
            if p.is_empty() {
                *p = project.clone();
            }
        };
        self.feature_views.iter_mut().for_each(|v| fill(&mut v.project));
        self.request_feature_views
            .iter_mut()
            .for_each(|v| fill(&mut v.project));
        self.feature_services
            .iter_mut()
            .for_each(|s| fill(&mut s.project));

        for view in &self.feature_views {
            view.validate()?;
        }
        for view in &self.request_feature_views {
            view.validate()?;
        }
        Ok(self)
    }

    /// Total number of definitions in the file
    pub fn len(&self) -> usize {
        self.entities.len()
            + self.feature_views.len()
            + self.request_feature_views.len()
            + self.feature_services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
