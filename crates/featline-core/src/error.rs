//! Error types for featline
//!
//! Every failure of a retrieval call maps onto one of four categories:
//!
//! - **Definition**: the request references something the registry does not
//!   define, or is malformed. Never retried.
//! - **Store**: the online store failed or timed out. Retryable by the caller;
//!   the engine itself never retries.
//! - **Cancellation**: the call's deadline elapsed or its cancellation signal
//!   fired before completion.
//! - **Internal**: a bug or misconfiguration.
//!
//! Staleness and absence are not errors; they are statuses on values.

use thiserror::Error;

/// Result type alias for operations that can fail
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error category, used by callers to decide on retries and by the
/// HTTP layer to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Definition,
    Store,
    Cancellation,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Definition => "definition",
            Self::Store => "store",
            Self::Cancellation => "cancellation",
            Self::Internal => "internal",
        }
    }
}

/// All possible errors that can occur in featline
#[derive(Error, Debug)]
pub enum Error {
    /// No feature view (stored or request) with this name exists in the project
    #[error("Feature view '{name}' not found in project '{project}'")]
    FeatureViewNotFound { project: String, name: String },

    /// The view exists but does not define the requested feature
    #[error("Feature '{feature}' not found in feature view '{feature_view}'")]
    FeatureNotFound {
        feature_view: String,
        feature: String,
    },

    /// Named feature group does not exist
    #[error("Feature service '{name}' not found in project '{project}'")]
    FeatureServiceNotFound { project: String, name: String },

    /// Reference string is not of the form `<view>:<feature>`
    #[error("Invalid feature reference '{0}': expected '<feature_view>:<feature>'")]
    InvalidFeatureReference(String),

    /// The view exists but has `online == false`
    #[error("Feature view '{0}' is not servable online")]
    NotServableOnline(String),

    /// A request row lacks a field declared by a request feature view's schema
    #[error("Missing request data field '{field}' for request feature view '{feature_view}' (row {row})")]
    MissingRequestData {
        feature_view: String,
        field: String,
        row: usize,
    },

    /// A caller-supplied request value does not match the declared type
    #[error("Invalid request data for field '{field}' of '{feature_view}': {reason}")]
    InvalidRequestData {
        feature_view: String,
        field: String,
        reason: String,
    },

    /// A request row lacks a join key needed by a requested feature view
    #[error("Entity key '{entity}' is required but missing from row {row}")]
    MissingEntityKey { entity: String, row: usize },

    /// Request feature views were referenced while on-demand serving is disabled
    #[error("On-demand features are disabled; cannot serve request feature view '{0}'")]
    OnDemandDisabled(String),

    /// A definition violates a schema invariant (empty entities, bad source, ...)
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    /// Invalid input from the caller (empty feature list, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Online store or registry backend failure
    ///
    /// Wraps the backend error to keep its context chain.
    #[error("Storage error: {0}")]
    StorageError(#[from] anyhow::Error),

    /// A batch read for one feature view did not complete
    #[error("Online store read for feature view '{feature_view}' failed: {message}")]
    StoreReadFailed {
        feature_view: String,
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The call's deadline elapsed
    #[error("Deadline exceeded before the call completed")]
    DeadlineExceeded,

    /// The call was cancelled by its caller
    #[error("Call was cancelled")]
    Cancelled,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error - indicates a bug
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl Error {
    /// Returns the category this error belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::FeatureViewNotFound { .. }
            | Self::FeatureNotFound { .. }
            | Self::FeatureServiceNotFound { .. }
            | Self::InvalidFeatureReference(_)
            | Self::NotServableOnline(_)
            | Self::MissingRequestData { .. }
            | Self::InvalidRequestData { .. }
            | Self::MissingEntityKey { .. }
            | Self::OnDemandDisabled(_)
            | Self::InvalidDefinition(_)
            | Self::InvalidInput(_) => ErrorCategory::Definition,
            Self::StorageError(_) | Self::StoreReadFailed { .. } => ErrorCategory::Store,
            Self::DeadlineExceeded | Self::Cancelled => ErrorCategory::Cancellation,
            Self::SerializationError(_) | Self::ConfigError(_) | Self::InternalError(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Store errors may succeed on a later attempt; nothing else will.
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Store
    }

    /// True for "this name does not exist" errors
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::FeatureViewNotFound { .. }
                | Self::FeatureNotFound { .. }
                | Self::FeatureServiceNotFound { .. }
        )
    }

    pub fn store_read(feature_view: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::StoreReadFailed {
            feature_view: feature_view.into(),
            message: err.to_string(),
        }
    }

    pub fn invalid_definition(msg: impl Into<String>) -> Self {
        Self::InvalidDefinition(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }
}
