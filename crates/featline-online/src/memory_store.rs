//! In-memory online store
//!
//! Keeps rows in a `HashMap` keyed by the same online key the Redis store
//! uses. Suitable for tests, local development and small single-process
//! deployments.

use async_trait::async_trait;
use featline_core::{
    CallContext, CompositeKey, OnlineStoreReader, OnlineStoreWriter, Result, StoredRow,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
pub struct InMemoryOnlineStore {
    rows: RwLock<HashMap<String, StoredRow>>,
    batch_reads: AtomicU64,
}

impl InMemoryOnlineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `read_batch` calls served so far
    pub fn batch_reads(&self) -> u64 {
        self.batch_reads.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.read_guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panic while holding the lock cannot leave a half-written row; recover.
    fn read_guard(&self) -> RwLockReadGuard<'_, HashMap<String, StoredRow>> {
        self.rows.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, HashMap<String, StoredRow>> {
        self.rows.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl OnlineStoreReader for InMemoryOnlineStore {
    async fn read_batch(
        &self,
        ctx: &CallContext,
        project: &str,
        feature_view: &str,
        keys: &[CompositeKey],
    ) -> Result<HashMap<CompositeKey, StoredRow>> {
        ctx.check()?;
        self.batch_reads.fetch_add(1, Ordering::Relaxed);

        let rows = self.read_guard();
        let found = keys
            .iter()
            .filter_map(|key| {
                rows.get(&key.to_online_key(project, feature_view))
                    .map(|row| (key.clone(), row.clone()))
            })
            .collect();
        Ok(found)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl OnlineStoreWriter for InMemoryOnlineStore {
    async fn write_rows(
        &self,
        project: &str,
        feature_view: &str,
        rows: Vec<(CompositeKey, StoredRow)>,
    ) -> Result<()> {
        let mut stored = self.write_guard();
        for (key, row) in rows {
            stored.insert(key.to_online_key(project, feature_view), row);
        }
        Ok(())
    }

    async fn delete_keys(
        &self,
        project: &str,
        feature_view: &str,
        keys: &[CompositeKey],
    ) -> Result<()> {
        let mut stored = self.write_guard();
        for key in keys {
            stored.remove(&key.to_online_key(project, feature_view));
        }
        Ok(())
    }
}
