//! Registry backend trait and configuration
//!
//! The backend persists published definitions as immutable records keyed by
//! `(project, name)` and can rebuild a full `RegistrySnapshot` from them.

use crate::snapshot::RegistrySnapshot;
use anyhow::Result;
use async_trait::async_trait;
use featline_core::{Entity, FeatureService, FeatureView, MaterializationInterval, RequestFeatureView};

/// Registry backend trait for storage operations
#[async_trait]
pub trait RegistryBackend: Send + Sync {
    /// Initialize schema (create tables, indexes)
    async fn init_schema(&self) -> Result<()>;

    async fn publish_entity(&self, project: &str, entity: &Entity) -> Result<()>;

    /// Publish a feature view, replacing any previous definition
    async fn publish_feature_view(&self, view: &FeatureView) -> Result<()>;

    async fn publish_request_feature_view(&self, view: &RequestFeatureView) -> Result<()>;

    async fn publish_feature_service(&self, service: &FeatureService) -> Result<()>;

    /// Delete a feature view and its materialization history
    async fn delete_feature_view(&self, project: &str, name: &str) -> Result<()>;

    /// Append a materialization interval; existing intervals are never rewritten
    async fn append_materialization_interval(
        &self,
        project: &str,
        feature_view: &str,
        interval: MaterializationInterval,
    ) -> Result<()>;

    /// Current registry version (bumped on every publish)
    async fn version(&self) -> Result<u64>;

    /// Rebuild a snapshot of everything published
    async fn load_snapshot(&self) -> Result<RegistrySnapshot>;
}

/// Configuration for registry backend
#[derive(Debug, Clone)]
pub enum RegistryConfig {
    /// SQLite with WAL mode (embedded, multi-process safe)
    SQLite {
        /// Path to SQLite database file
        path: String,
    },

    /// Private in-memory database (tests, dev mode)
    InMemory,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::SQLite {
            path: "./featline_registry.db".to_string(),
        }
    }
}

impl RegistryConfig {
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self::SQLite { path: path.into() }
    }
}
