//! CLI command implementations
//!
//! Publish definition files into the registry and inspect what is
//! registered.

use anyhow::{Context, Result};
use featline_registry::{FeatureRegistry, RegistryConfig, RegistryDefinitions};
use std::fs;

async fn open_registry(registry_path: &str) -> Result<FeatureRegistry> {
    FeatureRegistry::new(RegistryConfig::sqlite(registry_path))
        .await
        .with_context(|| format!("Failed to open registry '{}'", registry_path))
}

/// Reads a YAML definition file
pub fn read_definitions(file_path: &str) -> Result<RegistryDefinitions> {
    let yaml = fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read file '{}'", file_path))?;
    serde_yaml::from_str(&yaml).with_context(|| format!("Failed to parse YAML in '{}'", file_path))
}

/// Publishes every definition in `file_path`
///
/// Nothing is written if any definition is invalid.
pub async fn apply(file_path: String, registry_path: String) -> Result<()> {
    println!("📝 Applying definitions from: {}", file_path);

    let defs = read_definitions(&file_path)?;
    let project = defs.project.clone();
    let summary = format!(
        "{} entities, {} feature views, {} request feature views, {} feature services",
        defs.entities.len(),
        defs.feature_views.len(),
        defs.request_feature_views.len(),
        defs.feature_services.len()
    );

    let registry = open_registry(&registry_path).await?;
    let version = registry
        .apply(defs)
        .await
        .context("Failed to apply definitions")?;

    println!("✅ Applied to project '{}' ({})", project, summary);
    println!("   Registry version: {}", version);
    Ok(())
}

/// Lists the feature views of a project
pub async fn list(registry_path: String, project: String) -> Result<()> {
    let registry = open_registry(&registry_path).await?;
    let snapshot = registry.snapshot();

    let views = snapshot.list_feature_views(&project);
    let request_views = snapshot.list_request_feature_views(&project);
    if views.is_empty() && request_views.is_empty() {
        println!("No feature views found in project '{}'", project);
        return Ok(());
    }

    println!(
        "📋 Feature Views in '{}' (registry version {}):\n",
        project,
        snapshot.version()
    );
    println!(
        "{:<30} {:<25} {:<10} {:<12} {:<8}",
        "Name", "Entities", "Features", "TTL", "Online"
    );
    println!("{}", "-".repeat(88));

    for view in views {
        let ttl_display = view
            .ttl
            .map(|t| format!("{}s", t.as_secs()))
            .unwrap_or_else(|| "None".to_string());
        println!(
            "{:<30} {:<25} {:<10} {:<12} {:<8}",
            view.name,
            view.entities.join(", "),
            view.features.len(),
            ttl_display,
            view.online
        );
    }

    for view in request_views {
        println!(
            "{:<30} {:<25} {:<10} {:<12} {:<8}",
            view.name,
            "(request data)",
            view.schema().len(),
            "-",
            true
        );
    }

    Ok(())
}
