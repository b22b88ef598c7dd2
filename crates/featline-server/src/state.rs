//! Application state shared across all HTTP handlers
//!
//! Handlers receive the state explicitly through axum's `State` extractor;
//! there are no globals besides the metrics registry.

use crate::config::{Config, OnlineStoreConfig};
use anyhow::Context;
use featline_core::{CallContext, OnlineStoreReader};
use featline_online::InMemoryOnlineStore;
use featline_registry::{FeatureRegistry, RegistryConfig};
use featline_serving::RetrievalEngine;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shared application state
///
/// Cloning is cheap: every clone shares the same inner `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    engine: RetrievalEngine,
    /// Per-call deadline
    request_timeout: Duration,
    /// Parent of every call's cancellation token; cancelled on shutdown
    shutdown: CancellationToken,
    start_time: Instant,
}

impl AppState {
    pub fn new(
        engine: RetrievalEngine,
        request_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                engine,
                request_timeout,
                shutdown,
                start_time: Instant::now(),
            }),
        }
    }

    /// Opens the registry and online store described by `config`.
    ///
    /// Starts the registry refresh task when enabled; it stops when
    /// `shutdown` fires.
    pub async fn from_config(config: &Config, shutdown: CancellationToken) -> anyhow::Result<Self> {
        let registry = Arc::new(
            FeatureRegistry::new(RegistryConfig::sqlite(&config.registry.path))
                .await
                .with_context(|| format!("Failed to open registry '{}'", config.registry.path))?,
        );
        info!(
            path = %config.registry.path,
            version = registry.version(),
            "Registry loaded"
        );

        if let Some(interval) = config.registry.refresh_interval() {
            registry.spawn_refresh_task(interval, shutdown.clone());
            info!(interval_secs = interval.as_secs(), "Registry refresh enabled");
        }

        let store = open_online_store(&config.online_store).await?;
        info!(store = store.store_type(), "Online store ready");

        let engine = RetrievalEngine::new(registry.lookup(), store)
            .with_options(config.serving.engine_options());

        Ok(Self::new(
            engine,
            config.server.request_timeout(),
            shutdown,
        ))
    }

    pub fn engine(&self) -> &RetrievalEngine {
        &self.inner.engine
    }

    /// Context for one retrieval call: child of the shutdown token, with the
    /// configured deadline
    pub fn call_context(&self) -> CallContext {
        CallContext::with_parent(&self.inner.shutdown).with_timeout(self.inner.request_timeout)
    }

    pub fn request_timeout(&self) -> Duration {
        self.inner.request_timeout
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }

    pub fn uptime(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }
}

async fn open_online_store(config: &OnlineStoreConfig) -> anyhow::Result<Arc<dyn OnlineStoreReader>> {
    match config {
        OnlineStoreConfig::Memory => {
            warn!("Using the in-memory online store; it starts empty and is not shared");
            Ok(Arc::new(InMemoryOnlineStore::new()))
        }
        #[cfg(feature = "redis")]
        OnlineStoreConfig::Redis {
            url,
            write_batch_size,
            key_expiry_secs,
        } => {
            let redis_config = featline_online::RedisConfig {
                url: url.clone(),
                write_batch_size: *write_batch_size,
                key_expiry: key_expiry_secs.map(Duration::from_secs),
            };
            let store = featline_online::RedisOnlineStore::new(redis_config)
                .await
                .context("Failed to connect to the Redis online store")?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis"))]
        OnlineStoreConfig::Redis { .. } => {
            anyhow::bail!("online_store.type 'redis' requires the 'redis' feature")
        }
    }
}
