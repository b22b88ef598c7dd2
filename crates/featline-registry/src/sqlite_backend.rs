//! SQLite backend implementation with WAL mode
//!
//! This backend uses SQLite with Write-Ahead Logging (WAL) so the serving
//! process can read while an `apply` publishes from another process.

use crate::backend::RegistryBackend;
use crate::schema::{self, DefinitionKind};
use crate::snapshot::RegistrySnapshot;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use featline_core::{
    Entity, FeatureService, FeatureView, FeatureViewMeta, MaterializationInterval,
    RequestFeatureView,
};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// SQLite backend with WAL mode for multi-process safety
pub struct SqliteBackend {
    db: Arc<Mutex<Connection>>,
}

/// One stored definition row
struct SpecRow {
    project: String,
    name: String,
    spec: String,
    created_at: i64,
    updated_at: i64,
}

impl SqliteBackend {
    /// Create new SQLite backend from file path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )
        .context("Failed to open SQLite connection for registry")?;

        db.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to enable WAL mode")?;

        // Wait for locks instead of failing immediately
        db.pragma_update(None, "busy_timeout", 5000)
            .context("Failed to set busy timeout")?;

        db.pragma_update(None, "synchronous", "NORMAL")
            .context("Failed to set synchronous mode")?;

        info!("Initialized SQLite registry at {:?} with WAL mode", path.as_ref());

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Create in-memory SQLite backend (for testing)
    pub fn in_memory() -> Result<Self> {
        let db =
            Connection::open_in_memory().context("Failed to create in-memory SQLite connection")?;

        info!("Initialized in-memory SQLite registry");

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        // The connection is still usable after a panic in another holder.
        Ok(self.db.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn upsert(
        db: &Connection,
        kind: DefinitionKind,
        project: &str,
        name: &str,
        spec: &str,
    ) -> Result<()> {
        if project.trim().is_empty() {
            bail!("Cannot publish {} '{}' without a project", kind.table(), name);
        }

        let now = Utc::now().timestamp();
        let sql = format!(
            r#"
            INSERT INTO {} (project, name, spec, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            ON CONFLICT(project, name) DO UPDATE SET
                spec = excluded.spec,
                updated_at = excluded.updated_at
            "#,
            kind.table()
        );
        db.execute(&sql, params![project, name, spec, now])
            .with_context(|| format!("Failed to publish {} '{}'", kind.table(), name))?;

        db.execute(
            "UPDATE registry_meta SET value = value + 1 WHERE key = 'version'",
            [],
        )
        .context("Failed to bump registry version")?;

        debug!(project, name, table = kind.table(), "Published definition");
        Ok(())
    }

    fn exists(db: &Connection, kind: DefinitionKind, project: &str, name: &str) -> Result<bool> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE project = ?1 AND name = ?2",
            kind.table()
        );
        let found = db
            .query_row(&sql, params![project, name], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn load_specs(db: &Connection, kind: DefinitionKind) -> Result<Vec<SpecRow>> {
        let sql = format!(
            "SELECT project, name, spec, created_at, updated_at FROM {} ORDER BY project, name",
            kind.table()
        );
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(SpecRow {
                project: row.get(0)?,
                name: row.get(1)?,
                spec: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
            })
        })?;

        let mut specs = Vec::new();
        for row in rows {
            specs.push(row?);
        }
        Ok(specs)
    }

    fn load_intervals(
        db: &Connection,
    ) -> Result<HashMap<(String, String), Vec<MaterializationInterval>>> {
        let mut stmt = db.prepare(
            "SELECT project, feature_view, start_time_ms, end_time_ms
             FROM materialization_intervals ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut intervals: HashMap<(String, String), Vec<MaterializationInterval>> =
            HashMap::new();
        for row in rows {
            let (project, view, start, end) = row?;
            let interval = MaterializationInterval::new(timestamp_millis(start)?, timestamp_millis(end)?)?;
            intervals.entry((project, view)).or_default().push(interval);
        }
        Ok(intervals)
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| anyhow!("Invalid timestamp {}", secs))
}

fn timestamp_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| anyhow!("Invalid timestamp {}ms", millis))
}

fn parse_spec<T: serde::de::DeserializeOwned>(row: &SpecRow, kind: DefinitionKind) -> Result<T> {
    serde_json::from_str(&row.spec).with_context(|| {
        format!(
            "Corrupt {} record '{}' in project '{}'",
            kind.table(),
            row.name,
            row.project
        )
    })
}

#[async_trait]
impl RegistryBackend for SqliteBackend {
    async fn init_schema(&self) -> Result<()> {
        let db = self.lock()?;
        schema::create_tables(&db)?;
        Ok(())
    }

    async fn publish_entity(&self, project: &str, entity: &Entity) -> Result<()> {
        let mut db = self.lock()?;
        let tx = db.transaction()?;
        let spec = serde_json::to_string(entity)?;
        Self::upsert(&tx, DefinitionKind::Entity, project, &entity.name, &spec)?;
        tx.commit()?;
        Ok(())
    }

    async fn publish_feature_view(&self, view: &FeatureView) -> Result<()> {
        view.validate()?;

        let mut db = self.lock()?;
        let tx = db.transaction()?;
        if Self::exists(&tx, DefinitionKind::RequestFeatureView, &view.project, &view.name)? {
            bail!(
                "Name '{}' is already used by a request feature view in project '{}'",
                view.name,
                view.project
            );
        }
        let spec = serde_json::to_string(view)?;
        Self::upsert(&tx, DefinitionKind::FeatureView, &view.project, &view.name, &spec)?;
        tx.commit()?;
        Ok(())
    }

    async fn publish_request_feature_view(&self, view: &RequestFeatureView) -> Result<()> {
        view.validate()?;

        let mut db = self.lock()?;
        let tx = db.transaction()?;
        if Self::exists(&tx, DefinitionKind::FeatureView, &view.project, &view.name)? {
            bail!(
                "Name '{}' is already used by a feature view in project '{}'",
                view.name,
                view.project
            );
        }
        let spec = serde_json::to_string(view)?;
        Self::upsert(
            &tx,
            DefinitionKind::RequestFeatureView,
            &view.project,
            &view.name,
            &spec,
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn publish_feature_service(&self, service: &FeatureService) -> Result<()> {
        let mut db = self.lock()?;
        let tx = db.transaction()?;
        let spec = serde_json::to_string(service)?;
        Self::upsert(
            &tx,
            DefinitionKind::FeatureService,
            &service.project,
            &service.name,
            &spec,
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn delete_feature_view(&self, project: &str, name: &str) -> Result<()> {
        let mut db = self.lock()?;
        let tx = db.transaction()?;

        let deleted = tx
            .execute(
                "DELETE FROM feature_views WHERE project = ?1 AND name = ?2",
                params![project, name],
            )
            .context("Failed to delete feature view")?;
        if deleted == 0 {
            bail!("Feature view '{}' not found in project '{}'", name, project);
        }

        tx.execute(
            "DELETE FROM materialization_intervals WHERE project = ?1 AND feature_view = ?2",
            params![project, name],
        )?;
        tx.execute(
            "UPDATE registry_meta SET value = value + 1 WHERE key = 'version'",
            [],
        )?;
        tx.commit()?;

        debug!(project, name, "Deleted feature view");
        Ok(())
    }

    async fn append_materialization_interval(
        &self,
        project: &str,
        feature_view: &str,
        interval: MaterializationInterval,
    ) -> Result<()> {
        let mut db = self.lock()?;
        let tx = db.transaction()?;

        if !Self::exists(&tx, DefinitionKind::FeatureView, project, feature_view)? {
            bail!(
                "Feature view '{}' not found in project '{}'",
                feature_view,
                project
            );
        }

        tx.execute(
            "INSERT INTO materialization_intervals (project, feature_view, start_time_ms, end_time_ms)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                project,
                feature_view,
                interval.start_time.timestamp_millis(),
                interval.end_time.timestamp_millis()
            ],
        )
        .context("Failed to append materialization interval")?;
        tx.execute(
            "UPDATE feature_views SET updated_at = ?3 WHERE project = ?1 AND name = ?2",
            params![project, feature_view, Utc::now().timestamp()],
        )?;
        tx.execute(
            "UPDATE registry_meta SET value = value + 1 WHERE key = 'version'",
            [],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn version(&self) -> Result<u64> {
        let db = self.lock()?;
        let version: i64 = db
            .query_row(
                "SELECT value FROM registry_meta WHERE key = 'version'",
                [],
                |row| row.get(0),
            )
            .context("Registry schema not initialized")?;
        Ok(version.max(0) as u64)
    }

    async fn load_snapshot(&self) -> Result<RegistrySnapshot> {
        let version = self.version().await?;
        let db = self.lock()?;

        let mut builder = RegistrySnapshot::builder().version(version);

        for row in Self::load_specs(&db, DefinitionKind::Entity)? {
            let entity: Entity = parse_spec(&row, DefinitionKind::Entity)?;
            builder.add_entity(&row.project, entity);
        }

        let mut intervals = Self::load_intervals(&db)?;
        for row in Self::load_specs(&db, DefinitionKind::FeatureView)? {
            let view: FeatureView = parse_spec(&row, DefinitionKind::FeatureView)?;
            let meta = FeatureViewMeta {
                created_timestamp: timestamp(row.created_at)?,
                last_updated_timestamp: timestamp(row.updated_at)?,
                materialization_intervals: intervals
                    .remove(&(row.project.clone(), row.name.clone()))
                    .unwrap_or_default(),
            };
            builder.add_meta(&row.project, &row.name, meta);
            builder.add_feature_view(view);
        }

        for row in Self::load_specs(&db, DefinitionKind::RequestFeatureView)? {
            let view: RequestFeatureView = parse_spec(&row, DefinitionKind::RequestFeatureView)?;
            builder.add_request_feature_view(view);
        }

        for row in Self::load_specs(&db, DefinitionKind::FeatureService)? {
            let service: FeatureService = parse_spec(&row, DefinitionKind::FeatureService)?;
            builder.add_feature_service(service);
        }

        let snapshot = builder.build()?;
        debug!(version, "Loaded registry snapshot");
        Ok(snapshot)
    }
}
