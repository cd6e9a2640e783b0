//! Classified error model for cluster operations.
//!
//! Every storage action resolves to either a success value or a
//! [`ClusterError`] whose category decides retry behavior. Construct
//! via the category-specific factory methods.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad classification of a cluster operation failure.
///
/// Determines whether the retry policy may recover the call locally or
/// must escalate the run to a fatal halt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Connectivity failure (retryable).
    TransientNetwork,
    /// Cluster or index not yet in a usable state (retryable).
    NotReady,
    /// Index, alias, or cursor does not exist yet (retryable).
    NotFound,
    /// Index already exists; idempotent re-runs normalize this to success.
    AlreadyExists,
    /// Optimistic write lost to a concurrent writer (retryable per document).
    VersionConflict,
    /// Target mapping rejected; requires operator intervention.
    MappingConflict,
    /// Authentication or authorization failure.
    Auth,
    /// Malformed request.
    BadRequest,
    /// Server-side 5xx failure (retryable).
    Internal,
}

impl ErrorCategory {
    /// Whether the retry policy may recover this category locally.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::TransientNetwork
                | Self::NotReady
                | Self::NotFound
                | Self::VersionConflict
                | Self::Internal
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TransientNetwork => "transient_network",
            Self::NotReady => "not_ready",
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::VersionConflict => "version_conflict",
            Self::MappingConflict => "mapping_conflict",
            Self::Auth => "auth",
            Self::BadRequest => "bad_request",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Classified failure of a single cluster operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{category}: {message}")]
pub struct ClusterError {
    pub category: ErrorCategory,
    pub message: String,
}

impl ClusterError {
    /// Create an error with an explicit category.
    #[must_use]
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    /// Connectivity failure (retryable).
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::TransientNetwork, message)
    }

    /// Cluster or index not yet ready (retryable).
    #[must_use]
    pub fn not_ready(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::NotReady, message)
    }

    /// Missing index, alias, or cursor (retryable).
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::NotFound, message)
    }

    /// Index already exists.
    #[must_use]
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::AlreadyExists, message)
    }

    /// Optimistic write conflict.
    #[must_use]
    pub fn version_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::VersionConflict, message)
    }

    /// Mapping rejected by the cluster (fatal).
    #[must_use]
    pub fn mapping_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::MappingConflict, message)
    }

    /// Authentication or authorization failure (fatal).
    #[must_use]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Auth, message)
    }

    /// Malformed request (fatal).
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::BadRequest, message)
    }

    /// Server-side failure (retryable).
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Internal, message)
    }

    /// Whether the retry policy may recover this error locally.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_and_server_errors_are_retryable() {
        assert!(ClusterError::network("connection refused").is_retryable());
        assert!(ClusterError::not_ready("status red").is_retryable());
        assert!(ClusterError::not_found("no such index").is_retryable());
        assert!(ClusterError::internal("503 unavailable").is_retryable());
    }

    #[test]
    fn operator_errors_are_fatal() {
        assert!(!ClusterError::mapping_conflict("field type clash").is_retryable());
        assert!(!ClusterError::auth("forbidden").is_retryable());
        assert!(!ClusterError::bad_request("malformed body").is_retryable());
    }

    #[test]
    fn display_carries_category_and_message() {
        let err = ClusterError::auth("missing credentials");
        assert_eq!(err.to_string(), "auth: missing credentials");
    }

    #[test]
    fn category_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorCategory::VersionConflict).unwrap();
        assert_eq!(json, "\"version_conflict\"");
    }
}
