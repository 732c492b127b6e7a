//! Error types for the Volume Tracker
//!
//! Provides the structured error taxonomy raised by the topology core and
//! the ambient failures of the service around it.

use thiserror::Error;

/// Unified error type for the tracker
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Topology Errors
    // =========================================================================
    #[error("Invalid value for parameter {param}: {reason}")]
    InvalidParameter { param: String, reason: String },

    #[error("Item already exists: {item}")]
    DuplicateItem { item: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Parse / IO Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn invalid(param: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            param: param.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(item: impl Into<String>) -> Self {
        Error::DuplicateItem { item: item.into() }
    }

    /// Stable machine-readable code used in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidParameter { .. } => "invalid_parameter",
            Error::DuplicateItem { .. } => "duplicate_item",
            Error::NotFound { .. } => "not_found",
            Error::Internal(_) => "internal_error",
            Error::Configuration(_) => "configuration_error",
            Error::JsonParse(_) => "invalid_json",
            Error::Io(_) => "io_error",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Collapse an invalid-parameter failure from a deeper call into
    /// `NotFound` for the given item. Other errors pass through untouched.
    pub fn into_not_found(self, kind: &str, id: &str) -> Self {
        match self {
            Error::InvalidParameter { .. } => Error::not_found(kind, id),
            other => other,
        }
    }
}

/// Result type alias for the tracker
pub type Result<T> = std::result::Result<T, Error>;
