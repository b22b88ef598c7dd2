//! Configuration management
//!
//! Configuration comes from, in order of precedence:
//! - Command-line arguments (handled in main.rs)
//! - Environment variables (FEATLINE_*)
//! - YAML file (featline.yaml)
//!
//! ## Example Configuration File (featline.yaml)
//!
//! ```yaml
//! server:
//!   host: "0.0.0.0"
//!   port: 8000
//!   request_timeout_ms: 5000
//!
//! registry:
//!   path: "./featline_registry.db"
//!   refresh_interval_secs: 60
//!
//! online_store:
//!   type: redis
//!   url: "redis://localhost:6379"
//!
//! serving:
//!   ttl_boundary: inclusive
//!   on_demand_transforms: true
//! ```

use anyhow::{bail, Context};
use featline_serving::{EngineOptions, TtlBoundary};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const ENV_PORT: &str = "FEATLINE_PORT";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "FEATLINE_REQUEST_TIMEOUT_MS";
pub const ENV_REDIS_URL: &str = "FEATLINE_REDIS_URL";

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub registry: RegistrySettings,

    #[serde(default)]
    pub online_store: OnlineStoreConfig,

    #[serde(default)]
    pub serving: ServingConfig,
}

/// Server-specific configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Deadline of one retrieval call
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RegistrySettings {
    /// SQLite database file
    #[serde(default = "default_registry_path")]
    pub path: String,

    /// 0 disables background refresh
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

/// Online store backend
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OnlineStoreConfig {
    /// Process-local store, empty at startup
    #[default]
    Memory,

    Redis {
        url: String,

        #[serde(default = "default_write_batch_size")]
        write_batch_size: usize,

        #[serde(default)]
        key_expiry_secs: Option<u64>,
    },
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServingConfig {
    #[serde(default)]
    pub ttl_boundary: TtlBoundary,

    /// Serve request feature views
    #[serde(default = "default_true")]
    pub on_demand_transforms: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_registry_path() -> String {
    "./featline_registry.db".to_string()
}

fn default_refresh_interval_secs() -> u64 {
    60
}

fn default_write_batch_size() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_ms: default_request_timeout_ms(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            ttl_boundary: TtlBoundary::default(),
            on_demand_transforms: true,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl RegistrySettings {
    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_secs > 0).then(|| Duration::from_secs(self.refresh_interval_secs))
    }
}

impl ServingConfig {
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            ttl_boundary: self.ttl_boundary,
            on_demand_enabled: self.on_demand_transforms,
        }
    }
}

impl Config {
    /// Applies `FEATLINE_*` overrides read through `var`
    pub fn apply_overrides<F>(&mut self, var: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = var(ENV_PORT) {
            self.server.port = port
                .parse()
                .with_context(|| format!("{} is not a valid port: '{}'", ENV_PORT, port))?;
        }

        if let Some(timeout) = var(ENV_REQUEST_TIMEOUT_MS) {
            self.server.request_timeout_ms = timeout.parse().with_context(|| {
                format!("{} is not a number: '{}'", ENV_REQUEST_TIMEOUT_MS, timeout)
            })?;
        }

        if let Some(redis_url) = var(ENV_REDIS_URL) {
            match &mut self.online_store {
                OnlineStoreConfig::Redis { url, .. } => *url = redis_url,
                OnlineStoreConfig::Memory => {
                    self.online_store = OnlineStoreConfig::Redis {
                        url: redis_url,
                        write_batch_size: default_write_batch_size(),
                        key_expiry_secs: None,
                    }
                }
            }
        }

        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.request_timeout_ms == 0 {
            bail!("server.request_timeout_ms must be greater than zero");
        }
        if self.registry.path.is_empty() {
            bail!("registry.path must not be empty");
        }
        if let OnlineStoreConfig::Redis { url, .. } = &self.online_store {
            if url.is_empty() {
                bail!("online_store.url must not be empty");
            }
        }
        Ok(())
    }
}

/// Loads configuration from a file, then applies environment overrides
///
/// A missing file is not an error: defaults are used.
pub fn load(path: &str) -> anyhow::Result<Config> {
    let mut config = if Path::new(path).exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file '{}'", path))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse configuration file '{}'", path))?;
        tracing::info!("Loaded configuration from {}", path);
        config
    } else {
        tracing::warn!("Configuration file '{}' not found, using defaults", path);
        Config::default()
    };

    config.apply_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}
