//! # featline Core Library
//!
//! Foundation types shared by every featline crate: the schema model,
//! feature values and status codes, the error taxonomy, the call context,
//! and the online store read contract.
//!
//! This crate defines interfaces, not backends. Registry storage lives in
//! `featline-registry`, online store backends in `featline-online`, and the
//! retrieval engine in `featline-serving`.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use featline_core::{CallContext, CompositeKey, OnlineStoreReader};
//!
//! async fn fetch(store: &dyn OnlineStoreReader) -> featline_core::Result<()> {
//!     let ctx = CallContext::new();
//!     let keys = vec![CompositeKey::single("driver_id", "1001")];
//!     let rows = store.read_batch(&ctx, "rides", "driver_stats", &keys).await?;
//!     println!("{} rows", rows.len());
//!     Ok(())
//! }
//! ```

pub use context::CallContext;
pub use data_source::{DataSource, SourceOptions, SourceType};
pub use error::{Error, ErrorCategory, Result};
pub use feature_view::{
    Entity, FeatureService, FeatureSpec, FeatureView, FeatureViewMeta, FeatureViewProjection,
    MaterializationInterval, RequestFeatureView,
};
pub use online_store::{
    build_online_key, parse_online_key, CompositeKey, OnlineStoreReader, OnlineStoreWriter,
    StoredRow,
};
pub use types::{EntityKey, EntityRow, FeatureValue, FieldStatus, ValueType};

mod context;
mod data_source;
mod error;
mod feature_view;
mod online_store;
mod types;

pub mod prelude {
    pub use crate::context::CallContext;
    pub use crate::error::{Error, Result};
    pub use crate::feature_view::{FeatureView, RequestFeatureView};
    pub use crate::online_store::{CompositeKey, OnlineStoreReader, StoredRow};
    pub use crate::types::{EntityKey, EntityRow, FeatureValue, FieldStatus, ValueType};
}
