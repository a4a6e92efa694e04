//! Error types for mcp-guardian-rs
//!
//! Defines the single error enum shared by every component of the core
//! pipeline, with structured conversion to HTTP status codes at the admin
//! and proxy boundaries.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// The crate-wide error type.
#[derive(Error, Debug)]
pub enum GuardianError {
    /// Invalid service configuration (bad name, too-frequent check, bad URL).
    #[error("config error: {0}")]
    Config(String),

    /// Network failure, timeout, or TLS failure reaching an upstream.
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// Non-JSON body, invalid JSON-RPC envelope, or SSE stream without a response.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A JSON-RPC error other than -32601 (method not found).
    #[error("upstream RPC error {code}: {message}")]
    Rpc { code: i32, message: String },

    /// Admin lookup of a missing service or snapshot.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate service name.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unexpected internal state.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result alias for Guardian operations.
pub type GuardianResult<T> = Result<T, GuardianError>;

impl GuardianError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    pub fn upstream_unreachable<S: Into<String>>(message: S) -> Self {
        Self::UpstreamUnreachable(message.into())
    }

    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol(message.into())
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict(message.into())
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// -32601 ("method not found") is not an error at the capability-listing
    /// level; callers that need to distinguish it from other RPC errors can
    /// match directly on `Rpc { code, .. }` instead of going through this enum.
    pub fn is_method_not_found(code: i32) -> bool {
        code == -32601
    }

    /// Whether this error represents a condition C6 should silently skip
    /// (failure tolerance, spec.md §4.6) rather than surface.
    pub fn is_skippable_by_scheduler(&self) -> bool {
        matches!(
            self,
            GuardianError::UpstreamUnreachable(_) | GuardianError::Protocol(_)
        )
    }

    /// Category label for structured logging.
    pub fn category(&self) -> &'static str {
        match self {
            GuardianError::Config(_) => "config",
            GuardianError::UpstreamUnreachable(_) => "upstream_unreachable",
            GuardianError::Protocol(_) => "protocol",
            GuardianError::Rpc { .. } => "rpc",
            GuardianError::NotFound(_) => "not_found",
            GuardianError::Conflict(_) => "conflict",
            GuardianError::Internal(_) => "internal",
            GuardianError::Serialization(_) => "serialization",
            GuardianError::Io(_) => "io",
            GuardianError::Database(_) => "database",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for GuardianError {
    fn into_response(self) -> Response {
        let status = match &self {
            GuardianError::Config(_) | GuardianError::Rpc { .. } => StatusCode::BAD_REQUEST,
            GuardianError::NotFound(_) => StatusCode::NOT_FOUND,
            GuardianError::Conflict(_) => StatusCode::CONFLICT,
            GuardianError::UpstreamUnreachable(_) | GuardianError::Protocol(_) => {
                StatusCode::BAD_GATEWAY
            }
            GuardianError::Internal(_)
            | GuardianError::Serialization(_)
            | GuardianError::Io(_)
            | GuardianError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ErrorBody {
            error: self.category(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skippable_errors_match_scheduler_failure_tolerance() {
        assert!(GuardianError::upstream_unreachable("timeout").is_skippable_by_scheduler());
        assert!(GuardianError::protocol("bad envelope").is_skippable_by_scheduler());
        assert!(!GuardianError::conflict("dup").is_skippable_by_scheduler());
    }

    #[test]
    fn categories_are_stable() {
        assert_eq!(GuardianError::config("x").category(), "config");
        assert_eq!(
            GuardianError::Rpc { code: -32000, message: "x".into() }.category(),
            "rpc"
        );
    }

    #[test]
    fn method_not_found_code_is_distinguished() {
        assert!(GuardianError::is_method_not_found(-32601));
        assert!(!GuardianError::is_method_not_found(-32000));
    }

    #[test]
    fn status_codes_match_error_handling_design() {
        assert_eq!(
            GuardianError::not_found("svc").into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GuardianError::conflict("dup").into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            GuardianError::upstream_unreachable("down")
                .into_response()
                .status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
