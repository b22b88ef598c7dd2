//! Reference resolution
//!
//! Expands the caller's selection into feature references, checks every one
//! against a single registry snapshot, groups them per view and validates
//! the entity rows against what those views need. Pure: no I/O, no side
//! effects. Any failure fails the whole call.

use crate::request::{FeatureReference, FeatureSelection, RetrievalRequest};
use featline_core::{
    CompositeKey, EntityKey, EntityRow, Error, FeatureValue, FeatureView, RequestFeatureView,
    Result,
};
use featline_registry::{RegistrySnapshot, ViewDefinition};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Features requested from one materialized view
#[derive(Debug, Clone)]
pub struct StoredViewRequest {
    pub view: Arc<FeatureView>,
    /// Distinct features, in order of first reference
    pub features: Vec<String>,
}

/// Features requested from one request feature view
#[derive(Debug, Clone)]
pub struct OnDemandViewRequest {
    pub view: Arc<RequestFeatureView>,
    pub features: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    /// Every reference in request order, duplicates kept
    pub references: Vec<FeatureReference>,
    /// Views to fetch from the online store, in order of first reference
    pub stored: Vec<StoredViewRequest>,
    pub on_demand: Vec<OnDemandViewRequest>,
    /// Union of join keys needed across `stored`
    pub entity_names: BTreeSet<String>,
}

pub struct ReferenceResolver<'a> {
    snapshot: &'a RegistrySnapshot,
    on_demand_enabled: bool,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(snapshot: &'a RegistrySnapshot, on_demand_enabled: bool) -> Self {
        Self {
            snapshot,
            on_demand_enabled,
        }
    }

    pub fn resolve(&self, request: &RetrievalRequest) -> Result<ResolvedRequest> {
        let project = request.project.as_str();
        let references = self.expand(project, &request.features)?;
        if references.is_empty() {
            return Err(Error::invalid_input("no features requested"));
        }
        check_name_collisions(&references, request.full_feature_names)?;

        let mut stored: Vec<StoredViewRequest> = Vec::new();
        let mut on_demand: Vec<OnDemandViewRequest> = Vec::new();
        let mut stored_index: HashMap<String, usize> = HashMap::new();
        let mut on_demand_index: HashMap<String, usize> = HashMap::new();

        for reference in &references {
            match self.snapshot.require_view(project, &reference.feature_view)? {
                ViewDefinition::Stored(view) => {
                    if !view.online {
                        return Err(Error::NotServableOnline(view.name.clone()));
                    }
                    if view.feature(&reference.feature).is_none() {
                        return Err(feature_not_found(reference));
                    }
                    let idx = *stored_index.entry(view.name.clone()).or_insert_with(|| {
                        stored.push(StoredViewRequest {
                            view: Arc::clone(&view),
                            features: Vec::new(),
                        });
                        stored.len() - 1
                    });
                    push_unique(&mut stored[idx].features, &reference.feature);
                }
                ViewDefinition::Request(view) => {
                    if !self.on_demand_enabled {
                        return Err(Error::OnDemandDisabled(view.name.clone()));
                    }
                    if !view.schema().contains_key(&reference.feature) {
                        return Err(feature_not_found(reference));
                    }
                    let idx = *on_demand_index.entry(view.name.clone()).or_insert_with(|| {
                        on_demand.push(OnDemandViewRequest {
                            view: Arc::clone(&view),
                            features: Vec::new(),
                        });
                        on_demand.len() - 1
                    });
                    push_unique(&mut on_demand[idx].features, &reference.feature);
                }
            }
        }

        let entity_names: BTreeSet<String> = stored
            .iter()
            .flat_map(|s| s.view.entities.iter().cloned())
            .collect();
        let join_keys: Vec<String> = entity_names.iter().cloned().collect();

        for (i, row) in request.entity_rows.iter().enumerate() {
            composite_key(row, i, &join_keys)?;
            for request_view in &on_demand {
                check_request_data(row, i, &request_view.view)?;
            }
        }

        Ok(ResolvedRequest {
            references,
            stored,
            on_demand,
            entity_names,
        })
    }

    fn expand(&self, project: &str, selection: &FeatureSelection) -> Result<Vec<FeatureReference>> {
        match selection {
            FeatureSelection::Features(refs) => refs.iter().map(|r| r.parse()).collect(),
            FeatureSelection::FeatureService(name) => {
                let service = self
                    .snapshot
                    .get_feature_service(project, name)
                    .ok_or_else(|| Error::FeatureServiceNotFound {
                        project: project.to_string(),
                        name: name.clone(),
                    })?;

                let mut refs = Vec::new();
                for projection in &service.projections {
                    if !projection.features.is_empty() {
                        refs.extend(
                            projection
                                .features
                                .iter()
                                .map(|f| FeatureReference::new(&projection.feature_view, f)),
                        );
                        continue;
                    }
                    // empty projection selects the whole view
                    match self.snapshot.require_view(project, &projection.feature_view)? {
                        ViewDefinition::Stored(view) => refs.extend(
                            view.feature_names()
                                .map(|f| FeatureReference::new(&view.name, f)),
                        ),
                        ViewDefinition::Request(view) => refs.extend(
                            view.schema()
                                .keys()
                                .map(|f| FeatureReference::new(&view.name, f)),
                        ),
                    }
                }
                Ok(refs)
            }
        }
    }
}

/// Builds the join key of `row` for `entities`, in canonical order
pub fn composite_key(row: &EntityRow, row_index: usize, entities: &[String]) -> Result<CompositeKey> {
    let mut keys = Vec::with_capacity(entities.len());
    for entity in entities {
        let value = match row.get(entity) {
            None | Some(FeatureValue::Null) => {
                return Err(Error::MissingEntityKey {
                    entity: entity.clone(),
                    row: row_index,
                })
            }
            Some(value) => value,
        };
        let rendered = value.to_key_string().ok_or_else(|| {
            Error::invalid_input(format!(
                "entity key '{}' in row {} must be an integer, string or bool",
                entity, row_index
            ))
        })?;
        keys.push(EntityKey::new(entity.as_str(), rendered));
    }
    Ok(CompositeKey::new(keys))
}

fn check_request_data(row: &EntityRow, row_index: usize, view: &RequestFeatureView) -> Result<()> {
    for (field, value_type) in view.schema() {
        match row.get(field) {
            None | Some(FeatureValue::Null) => {
                return Err(Error::MissingRequestData {
                    feature_view: view.name.clone(),
                    field: field.clone(),
                    row: row_index,
                })
            }
            Some(value) if !value.conforms_to(*value_type) => {
                return Err(Error::InvalidRequestData {
                    feature_view: view.name.clone(),
                    field: field.clone(),
                    reason: format!("expected {} in row {}", value_type, row_index),
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Two different references may not produce the same output column
fn check_name_collisions(references: &[FeatureReference], full_feature_names: bool) -> Result<()> {
    let mut seen: HashMap<String, &FeatureReference> = HashMap::new();
    for reference in references {
        let name = reference.output_name(full_feature_names);
        if let Some(previous) = seen.insert(name.clone(), reference) {
            if previous != reference {
                return Err(Error::invalid_input(format!(
                    "feature name '{}' is ambiguous between '{}' and '{}'; request full feature names",
                    name, previous, reference
                )));
            }
        }
    }
    Ok(())
}

fn feature_not_found(reference: &FeatureReference) -> Error {
    Error::FeatureNotFound {
        feature_view: reference.feature_view.clone(),
        feature: reference.feature.clone(),
    }
}

fn push_unique(features: &mut Vec<String>, feature: &str) {
    if !features.iter().any(|f| f == feature) {
        features.push(feature.to_string());
    }
}
