//! Database schema for the registry
//!
//! # Tables
//!
//! - **entities**, **feature_views**, **request_feature_views**,
//!   **feature_services**: one row per `(project, name)`, the definition stored
//!   as a JSON spec. Publishing replaces the spec and keeps `created_at`.
//! - **materialization_intervals**: append-only, one row per backfilled range.
//! - **registry_meta**: a single version counter bumped on every publish.
//!
//! Definition timestamps are Unix epoch seconds. Interval bounds are epoch
//! milliseconds.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Definition tables, all sharing the same layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    Entity,
    FeatureView,
    RequestFeatureView,
    FeatureService,
}

impl DefinitionKind {
    pub fn table(&self) -> &'static str {
        match self {
            Self::Entity => "entities",
            Self::FeatureView => "feature_views",
            Self::RequestFeatureView => "request_feature_views",
            Self::FeatureService => "feature_services",
        }
    }
}

pub fn create_tables(db: &Connection) -> Result<()> {
    db.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS entities (
            project TEXT NOT NULL,
            name TEXT NOT NULL,
            spec TEXT NOT NULL,
            created_at BIGINT NOT NULL,
            updated_at BIGINT NOT NULL,
            PRIMARY KEY (project, name)
        );

        CREATE TABLE IF NOT EXISTS feature_views (
            project TEXT NOT NULL,
            name TEXT NOT NULL,
            spec TEXT NOT NULL,
            created_at BIGINT NOT NULL,
            updated_at BIGINT NOT NULL,
            PRIMARY KEY (project, name)
        );

        CREATE TABLE IF NOT EXISTS request_feature_views (
            project TEXT NOT NULL,
            name TEXT NOT NULL,
            spec TEXT NOT NULL,
            created_at BIGINT NOT NULL,
            updated_at BIGINT NOT NULL,
            PRIMARY KEY (project, name)
        );

        CREATE TABLE IF NOT EXISTS feature_services (
            project TEXT NOT NULL,
            name TEXT NOT NULL,
            spec TEXT NOT NULL,
            created_at BIGINT NOT NULL,
            updated_at BIGINT NOT NULL,
            PRIMARY KEY (project, name)
        );

        CREATE TABLE IF NOT EXISTS materialization_intervals (
            id INTEGER PRIMARY KEY,
            project TEXT NOT NULL,
            feature_view TEXT NOT NULL,
            start_time_ms BIGINT NOT NULL,
            end_time_ms BIGINT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_intervals_view
            ON materialization_intervals(project, feature_view);

        CREATE TABLE IF NOT EXISTS registry_meta (
            key TEXT PRIMARY KEY,
            value BIGINT NOT NULL
        );

        INSERT OR IGNORE INTO registry_meta (key, value) VALUES ('version', 0);
        "#,
    )
    .context("Failed to create registry tables")?;

    Ok(())
}
