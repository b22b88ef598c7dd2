//! featline Serving - online feature retrieval
//!
//! Turns a batch of entity rows and a list of feature references into
//! row-aligned feature vectors with a status per value.
//!
//! ```text
//! RetrievalRequest
//!   -> ReferenceResolver (registry snapshot)
//!   -> RetrievalEngine   (online store, one batch read per view)
//!   -> assemble          (request order)
//!   -> RetrievalResponse
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use featline_core::CallContext;
//! use featline_serving::{RetrievalEngine, RetrievalRequest};
//!
//! let engine = RetrievalEngine::new(registry.lookup(), store);
//! let request = RetrievalRequest::new(
//!     "rides",
//!     vec!["driver_hourly_stats:conv_rate".to_string()],
//!     rows,
//! );
//! let response = engine
//!     .get_online_features(&CallContext::new(), &request)
//!     .await?;
//! ```

mod assembler;
mod engine;
mod request;
mod resolver;

pub use assembler::{
    assemble, FeatureCell, FeatureColumns, FeatureVector, ResponseMetadata, RetrievalResponse,
};
pub use engine::{evaluate, EngineOptions, RetrievalEngine, TtlBoundary};
pub use request::{FeatureReference, FeatureSelection, RetrievalRequest};
pub use resolver::{
    composite_key, OnDemandViewRequest, ReferenceResolver, ResolvedRequest, StoredViewRequest,
};

use serde::Serialize;

/// Static server identification returned by the info endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServingInfo {
    pub version: &'static str,
}

pub const SERVING_INFO: ServingInfo = ServingInfo {
    version: env!("CARGO_PKG_VERSION"),
};
