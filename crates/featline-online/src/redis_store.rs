//! Redis online store
//!
//! ## Layout
//!
//! One Redis string per (project, feature view, composite key), named by
//! `build_online_key`. The value is the JSON-encoded `StoredRow`, so the
//! event timestamp travels with the features it describes.
//!
//! ## Round-trips
//!
//! - Reads: one `MGET` for every key of a feature view
//! - Writes: pipelined `SET`s, one round-trip per `write_batch_size` rows
//! - Connection: multiplexed `ConnectionManager` (one TCP connection,
//!   many concurrent requests, reconnects on its own)

use async_trait::async_trait;
use featline_core::{
    CallContext, CompositeKey, Error, OnlineStoreReader, OnlineStoreWriter, Result, StoredRow,
};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Pipeline};
use std::collections::HashMap;
use std::time::Duration;

/// Redis online store configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Pipeline batch size for writes
    pub write_batch_size: usize,
    /// Optional Redis-side expiry applied to written keys. Independent of the
    /// feature view ttl, which is always evaluated at read time.
    pub key_expiry: Option<Duration>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            write_batch_size: 1000,
            key_expiry: None,
        }
    }
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

pub struct RedisOnlineStore {
    conn: ConnectionManager,
    config: RedisConfig,
}

impl RedisOnlineStore {
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.clone()).map_err(|e| {
            Error::StorageError(anyhow::anyhow!("Redis connection error: {}", e))
        })?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            Error::StorageError(anyhow::anyhow!("Redis connection manager error: {}", e))
        })?;

        tracing::info!(url = %config.url, "Connected to Redis online store");
        Ok(Self { conn, config })
    }

    fn serialize_row(row: &StoredRow) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(row)?)
    }

    fn deserialize_row(feature_view: &str, data: &[u8]) -> Result<StoredRow> {
        serde_json::from_slice(data)
            .map_err(|e| Error::store_read(feature_view, format!("corrupt row: {}", e)))
    }
}

#[async_trait]
impl OnlineStoreReader for RedisOnlineStore {
    /// Reads every key with a single MGET
    async fn read_batch(
        &self,
        ctx: &CallContext,
        project: &str,
        feature_view: &str,
        keys: &[CompositeKey],
    ) -> Result<HashMap<CompositeKey, StoredRow>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        ctx.check()?;

        let mut conn = self.conn.clone();
        let redis_keys: Vec<String> = keys
            .iter()
            .map(|k| k.to_online_key(project, feature_view))
            .collect();

        let values: Vec<Option<Vec<u8>>> = ctx
            .run(async {
                conn.mget(&redis_keys)
                    .await
                    .map_err(|e| Error::store_read(feature_view, format!("MGET failed: {}", e)))
            })
            .await?;

        let mut rows = HashMap::with_capacity(keys.len());
        for (key, value) in keys.iter().zip(values) {
            if let Some(data) = value {
                rows.insert(key.clone(), Self::deserialize_row(feature_view, &data)?);
            }
        }

        tracing::debug!(
            feature_view,
            requested = keys.len(),
            found = rows.len(),
            "Redis batch read"
        );
        Ok(rows)
    }

    /// Health check using PING
    async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::StorageError(anyhow::anyhow!("Redis PING failed: {}", e)))?;

        if pong != "PONG" {
            return Err(Error::StorageError(anyhow::anyhow!(
                "Redis health check failed: expected PONG, got {}",
                pong
            )));
        }

        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "redis"
    }
}

#[async_trait]
impl OnlineStoreWriter for RedisOnlineStore {
    /// Write rows using pipelined SET commands (one round-trip per batch)
    async fn write_rows(
        &self,
        project: &str,
        feature_view: &str,
        rows: Vec<(CompositeKey, StoredRow)>,
    ) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.clone();
        let batch_size = self.config.write_batch_size.max(1);

        for chunk in rows.chunks(batch_size) {
            let mut pipe = Pipeline::new();

            for (key, row) in chunk {
                let redis_key = key.to_online_key(project, feature_view);
                let value = Self::serialize_row(row)?;

                match self.config.key_expiry {
                    Some(expiry) => pipe.set_ex(&redis_key, value, expiry.as_secs()),
                    None => pipe.set(&redis_key, value),
                };
            }

            pipe.query_async::<_, ()>(&mut conn)
                .await
                .map_err(|e| Error::StorageError(anyhow::anyhow!("Redis pipeline error: {}", e)))?;
        }

        tracing::debug!(feature_view, rows_written = rows.len(), "Redis write complete");
        Ok(())
    }

    async fn delete_keys(
        &self,
        project: &str,
        feature_view: &str,
        keys: &[CompositeKey],
    ) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.clone();
        let redis_keys: Vec<String> = keys
            .iter()
            .map(|k| k.to_online_key(project, feature_view))
            .collect();

        conn.del::<_, ()>(&redis_keys)
            .await
            .map_err(|e| Error::StorageError(anyhow::anyhow!("Redis DEL error: {}", e)))?;

        Ok(())
    }
}
