//! Feature Registry for featline
//!
//! Persists published definitions (entities, feature views, request feature
//! views, feature services) and serves them to the retrieval path as
//! immutable, versioned snapshots:
//! - **SQLite with WAL** - Embedded, multi-process safe; `apply` can publish
//!   from the CLI while a server is reading
//! - **RegistrySnapshot** - What a retrieval call reads; never mutated
//! - **SnapshotRegistry** - Swaps the current snapshot atomically
//!
//! # Examples
//!
//! ```rust,ignore
//! use featline_registry::{FeatureRegistry, RegistryConfig, RegistryDefinitions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = FeatureRegistry::new(RegistryConfig::sqlite("./registry.db")).await?;
//!
//!     let yaml = std::fs::read_to_string("definitions.yaml")?;
//!     let defs: RegistryDefinitions = serde_yaml::from_str(&yaml)?;
//!     let version = registry.apply(defs).await?;
//!
//!     let snapshot = registry.snapshot();
//!     assert_eq!(snapshot.version(), version);
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use featline_core::{
    Entity, FeatureService, FeatureView, FeatureViewMeta, MaterializationInterval,
    RequestFeatureView,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub mod backend;
pub use backend::{RegistryBackend, RegistryConfig};

mod definitions;
mod lookup;
mod schema;
mod snapshot;
mod sqlite_backend;

pub use definitions::RegistryDefinitions;
pub use lookup::{RegistryLookup, SnapshotRegistry};
pub use snapshot::{RegistrySnapshot, RegistrySnapshotBuilder, ViewDefinition};
pub use sqlite_backend::SqliteBackend;

/// Feature Registry with pluggable backend
///
/// Every publish is validated against the full set of registered
/// definitions before it is written, then the in-process snapshot is
/// refreshed so readers see the new version.
pub struct FeatureRegistry {
    backend: Arc<dyn RegistryBackend>,
    snapshots: Arc<SnapshotRegistry>,
}

impl FeatureRegistry {
    /// Create new registry with specified backend configuration
    pub async fn new(config: RegistryConfig) -> Result<Self> {
        let backend: Arc<dyn RegistryBackend> = match config {
            RegistryConfig::SQLite { path } => Arc::new(SqliteBackend::new(&path)?),
            RegistryConfig::InMemory => Arc::new(SqliteBackend::in_memory()?),
        };

        Self::with_backend(backend).await
    }

    /// Create in-memory registry (for testing)
    pub async fn in_memory() -> Result<Self> {
        Self::new(RegistryConfig::InMemory).await
    }

    pub async fn with_backend(backend: Arc<dyn RegistryBackend>) -> Result<Self> {
        backend.init_schema().await?;

        let registry = Self {
            backend,
            snapshots: Arc::new(SnapshotRegistry::default()),
        };
        registry.refresh().await?;
        Ok(registry)
    }

    /// Publishes every definition in `defs` and returns the new version.
    ///
    /// Nothing is written if any definition is invalid or references
    /// something that is neither registered nor part of `defs`.
    pub async fn apply(&self, defs: RegistryDefinitions) -> Result<u64> {
        let defs = defs.normalize()?;

        let mut candidate = self.backend.load_snapshot().await?.to_builder();
        for entity in &defs.entities {
            candidate.add_entity(&defs.project, entity.clone());
        }
        for view in &defs.feature_views {
            candidate.add_feature_view(view.clone());
        }
        for view in &defs.request_feature_views {
            candidate.add_request_feature_view(view.clone());
        }
        for service in &defs.feature_services {
            candidate.add_feature_service(service.clone());
        }
        candidate
            .build()
            .with_context(|| format!("Rejected definitions for project '{}'", defs.project))?;

        for entity in &defs.entities {
            self.backend.publish_entity(&defs.project, entity).await?;
        }
        for view in &defs.feature_views {
            self.backend.publish_feature_view(view).await?;
        }
        for view in &defs.request_feature_views {
            self.backend.publish_request_feature_view(view).await?;
        }
        for service in &defs.feature_services {
            self.backend.publish_feature_service(service).await?;
        }

        let version = self.refresh().await?;
        info!(
            project = %defs.project,
            definitions = defs.len(),
            version,
            "Applied registry definitions"
        );
        Ok(version)
    }

    pub async fn publish_entity(&self, project: &str, entity: Entity) -> Result<u64> {
        let mut defs = RegistryDefinitions::new(project);
        defs.entities.push(entity);
        self.apply(defs).await
    }

    /// Register or replace a feature view
    pub async fn publish_feature_view(&self, view: FeatureView) -> Result<u64> {
        let mut defs = RegistryDefinitions::new(view.project.clone());
        defs.feature_views.push(view);
        self.apply(defs).await
    }

    pub async fn publish_request_feature_view(&self, view: RequestFeatureView) -> Result<u64> {
        let mut defs = RegistryDefinitions::new(view.project.clone());
        defs.request_feature_views.push(view);
        self.apply(defs).await
    }

    pub async fn publish_feature_service(&self, service: FeatureService) -> Result<u64> {
        let mut defs = RegistryDefinitions::new(service.project.clone());
        defs.feature_services.push(service);
        self.apply(defs).await
    }

    /// Delete a feature view. Fails if a feature service still projects it.
    pub async fn delete_feature_view(&self, project: &str, name: &str) -> Result<u64> {
        let mut candidate = self.backend.load_snapshot().await?.to_builder();
        candidate.remove_feature_view(project, name);
        candidate
            .build()
            .with_context(|| format!("Cannot delete feature view '{}'", name))?;

        self.backend.delete_feature_view(project, name).await?;
        self.refresh().await
    }

    /// Record a backfilled time range for a feature view
    pub async fn append_materialization_interval(
        &self,
        project: &str,
        feature_view: &str,
        interval: MaterializationInterval,
    ) -> Result<u64> {
        self.backend
            .append_materialization_interval(project, feature_view, interval)
            .await?;
        self.refresh().await
    }

    /// Reloads definitions from the backend and swaps in a new snapshot if
    /// the version moved. Returns the current version.
    pub async fn refresh(&self) -> Result<u64> {
        let backend_version = self.backend.version().await?;
        if backend_version == self.snapshots.version() {
            return Ok(backend_version);
        }

        let snapshot = self.backend.load_snapshot().await?;
        let version = snapshot.version();
        let previous = self.snapshots.swap(snapshot);
        if previous.version() != version {
            debug!(from = previous.version(), to = version, "Swapped registry snapshot");
        }
        Ok(self.snapshots.version())
    }

    /// Periodically picks up definitions published by other processes until
    /// `shutdown` fires
    pub fn spawn_refresh_task(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Registry refresh task stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = registry.refresh().await {
                            warn!("Registry refresh failed: {:#}", e);
                        }
                    }
                }
            }
        })
    }

    /// The read side handed to the retrieval engine
    pub fn lookup(&self) -> Arc<dyn RegistryLookup> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshots.snapshot()
    }

    pub fn version(&self) -> u64 {
        self.snapshots.version()
    }

    pub fn feature_view_meta(&self, project: &str, name: &str) -> Option<FeatureViewMeta> {
        self.snapshot().feature_view_meta(project, name).cloned()
    }
}
