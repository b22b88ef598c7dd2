//! featline Online Store - low-latency readers for feature serving
//!
//! Backends for the `OnlineStoreReader` contract defined in `featline-core`.
//! Rows are written upstream by the materializer; the serving path only
//! reads.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use featline_core::{CallContext, CompositeKey, OnlineStoreReader};
//! use featline_online::{RedisConfig, RedisOnlineStore};
//!
//! let store = RedisOnlineStore::new(RedisConfig::new("redis://localhost:6379")).await?;
//! let keys = vec![CompositeKey::single("driver_id", "1001")];
//! let rows = store
//!     .read_batch(&CallContext::new(), "rides", "driver_hourly_stats", &keys)
//!     .await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `redis` (default): Enable Redis online store

pub use featline_core::{
    build_online_key, parse_online_key, CompositeKey, OnlineStoreReader, OnlineStoreWriter,
    StoredRow,
};

pub mod memory_store;
pub use memory_store::InMemoryOnlineStore;

// Redis store (default feature)
#[cfg(feature = "redis")]
pub mod redis_store;
#[cfg(feature = "redis")]
pub use redis_store::{RedisConfig, RedisOnlineStore};
