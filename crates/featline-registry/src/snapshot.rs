//! Immutable registry snapshots
//!
//! A `RegistrySnapshot` is a read-only view of every published definition,
//! keyed by `(project, name)`. Snapshots are never mutated; a publish produces
//! a new snapshot with a higher version, which `SnapshotRegistry` swaps in
//! atomically.

use featline_core::{
    Entity, Error, FeatureService, FeatureView, FeatureViewMeta, RequestFeatureView, Result,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Result of looking up a view name: either a materialized view or a
/// request-time view
#[derive(Debug, Clone)]
pub enum ViewDefinition {
    Stored(Arc<FeatureView>),
    Request(Arc<RequestFeatureView>),
}

impl ViewDefinition {
    pub fn name(&self) -> &str {
        match self {
            Self::Stored(view) => &view.name,
            Self::Request(view) => &view.name,
        }
    }
}

#[derive(Debug, Default, Clone)]
struct ProjectDefinitions {
    entities: BTreeMap<String, Arc<Entity>>,
    feature_views: BTreeMap<String, Arc<FeatureView>>,
    request_feature_views: BTreeMap<String, Arc<RequestFeatureView>>,
    feature_services: BTreeMap<String, Arc<FeatureService>>,
    meta: HashMap<String, FeatureViewMeta>,
}

/// Read-only registry state at one version
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    version: u64,
    projects: HashMap<String, ProjectDefinitions>,
}

impl RegistrySnapshot {
    pub fn builder() -> RegistrySnapshotBuilder {
        RegistrySnapshotBuilder::default()
    }

    /// An empty snapshot at version 0
    pub fn empty() -> Self {
        Self::default()
    }

    /// A builder seeded with this snapshot's definitions, used to check a
    /// publish against everything already registered
    pub fn to_builder(&self) -> RegistrySnapshotBuilder {
        RegistrySnapshotBuilder {
            version: self.version,
            projects: self.projects.clone(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Looks up a feature view or request feature view by name
    pub fn get_view(&self, project: &str, name: &str) -> Option<ViewDefinition> {
        let defs = self.projects.get(project)?;
        if let Some(view) = defs.feature_views.get(name) {
            return Some(ViewDefinition::Stored(Arc::clone(view)));
        }
        defs.request_feature_views
            .get(name)
            .map(|view| ViewDefinition::Request(Arc::clone(view)))
    }

    /// Like `get_view`, but reports a missing view as a definition error
    pub fn require_view(&self, project: &str, name: &str) -> Result<ViewDefinition> {
        self.get_view(project, name)
            .ok_or_else(|| Error::FeatureViewNotFound {
                project: project.to_string(),
                name: name.to_string(),
            })
    }

    pub fn get_feature_view(&self, project: &str, name: &str) -> Option<Arc<FeatureView>> {
        self.projects
            .get(project)?
            .feature_views
            .get(name)
            .cloned()
    }

    pub fn get_request_feature_view(
        &self,
        project: &str,
        name: &str,
    ) -> Option<Arc<RequestFeatureView>> {
        self.projects
            .get(project)?
            .request_feature_views
            .get(name)
            .cloned()
    }

    pub fn get_entity(&self, project: &str, name: &str) -> Option<Arc<Entity>> {
        self.projects.get(project)?.entities.get(name).cloned()
    }

    pub fn get_feature_service(&self, project: &str, name: &str) -> Option<Arc<FeatureService>> {
        self.projects
            .get(project)?
            .feature_services
            .get(name)
            .cloned()
    }

    pub fn feature_view_meta(&self, project: &str, name: &str) -> Option<&FeatureViewMeta> {
        self.projects.get(project)?.meta.get(name)
    }

    /// Feature views of a project, sorted by name
    pub fn list_feature_views(&self, project: &str) -> Vec<Arc<FeatureView>> {
        self.projects
            .get(project)
            .map(|defs| defs.feature_views.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn list_request_feature_views(&self, project: &str) -> Vec<Arc<RequestFeatureView>> {
        self.projects
            .get(project)
            .map(|defs| defs.request_feature_views.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn projects(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.projects.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Collects definitions and validates cross-references before producing a
/// snapshot
#[derive(Debug, Default)]
pub struct RegistrySnapshotBuilder {
    version: u64,
    projects: HashMap<String, ProjectDefinitions>,
}

impl RegistrySnapshotBuilder {
    pub fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn entity(mut self, project: &str, entity: Entity) -> Self {
        self.add_entity(project, entity);
        self
    }

    pub fn feature_view(mut self, view: FeatureView) -> Self {
        self.add_feature_view(view);
        self
    }

    pub fn request_feature_view(mut self, view: RequestFeatureView) -> Self {
        self.add_request_feature_view(view);
        self
    }

    pub fn feature_service(mut self, service: FeatureService) -> Self {
        self.add_feature_service(service);
        self
    }

    pub fn add_entity(&mut self, project: &str, entity: Entity) {
        self.project(project)
            .entities
            .insert(entity.name.clone(), Arc::new(entity));
    }

    pub fn add_feature_view(&mut self, view: FeatureView) {
        let project = view.project.clone();
        self.project(&project)
            .feature_views
            .insert(view.name.clone(), Arc::new(view));
    }

    pub fn add_request_feature_view(&mut self, view: RequestFeatureView) {
        let project = view.project.clone();
        self.project(&project)
            .request_feature_views
            .insert(view.name.clone(), Arc::new(view));
    }

    pub fn add_feature_service(&mut self, service: FeatureService) {
        let project = service.project.clone();
        self.project(&project)
            .feature_services
            .insert(service.name.clone(), Arc::new(service));
    }

    pub fn add_meta(&mut self, project: &str, feature_view: &str, meta: FeatureViewMeta) {
        self.project(project)
            .meta
            .insert(feature_view.to_string(), meta);
    }

    pub fn remove_feature_view(&mut self, project: &str, name: &str) -> bool {
        let defs = self.project(project);
        defs.meta.remove(name);
        defs.feature_views.remove(name).is_some()
    }

    fn project(&mut self, project: &str) -> &mut ProjectDefinitions {
        self.projects.entry(project.to_string()).or_default()
    }

    /// Validates and freezes the collected definitions
    ///
    /// Rejects: a name used by both a feature view and a request feature view,
    /// views referencing unregistered entities, and feature services
    /// projecting unknown views or features.
    pub fn build(self) -> Result<RegistrySnapshot> {
        for (project, defs) in &self.projects {
            for view in defs.feature_views.values() {
                view.validate()?;
                if defs.request_feature_views.contains_key(&view.name) {
                    return Err(Error::invalid_definition(format!(
                        "name '{}' is used by both a feature view and a request feature view in project '{}'",
                        view.name, project
                    )));
                }
                for entity in &view.entities {
                    if !defs.entities.contains_key(entity) {
                        return Err(Error::invalid_definition(format!(
                            "feature view '{}' references unknown entity '{}'",
                            view.name, entity
                        )));
                    }
                }
            }
            for view in defs.request_feature_views.values() {
                view.validate()?;
            }
            for service in defs.feature_services.values() {
                validate_service(service, defs)?;
            }
        }

        Ok(RegistrySnapshot {
            version: self.version,
            projects: self.projects,
        })
    }
}

fn validate_service(service: &FeatureService, defs: &ProjectDefinitions) -> Result<()> {
    for projection in &service.projections {
        let view_name = &projection.feature_view;
        let has_feature: Box<dyn Fn(&str) -> bool> =
            if let Some(view) = defs.feature_views.get(view_name) {
                Box::new(move |f| view.feature(f).is_some())
            } else if let Some(view) = defs.request_feature_views.get(view_name) {
                Box::new(move |f| view.schema().contains_key(f))
            } else {
                return Err(Error::invalid_definition(format!(
                    "feature service '{}' references unknown feature view '{}'",
                    service.name, view_name
                )));
            };

        for feature in &projection.features {
            if !has_feature(feature) {
                return Err(Error::invalid_definition(format!(
                    "feature service '{}' references unknown feature '{}:{}'",
                    service.name, projection.feature_view, feature
                )));
            }
        }
    }
    Ok(())
}
