//! Error types for repository gateway operations.
//!
//! Two families of errors exist: [`ConfigError`] for construction-time
//! configuration problems, which abort type-handler construction entirely,
//! and [`RepoError`] for per-call failures, which are reported to the caller
//! and never tear the handler down.

use thiserror::Error;

/// Main error type for repository gateway operations.
///
/// Every failure that crosses the caller-facing surface is one of these
/// variants; errors are structured, with a human-readable message on top.
#[derive(Debug, Error)]
pub enum RepoError {
    /// The caller supplied an invalid request (unknown query or command id,
    /// malformed sort keys or fields, missing token parameter, bad filter)
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// The addressed resource does not exist in the backing store
    #[error("Resource '{id}' not found")]
    NotFound { id: String },

    /// A create addressed an identifier that is already taken
    #[error("Resource '{id}' already exists")]
    AlreadyExists { id: String },

    /// A write carried a revision that no longer matches the stored record
    #[error("Revision mismatch for resource '{id}'")]
    VersionConflict { id: String },

    /// A create or update would duplicate a configured unique attribute combination
    #[error("Unique constraint on [{}] violated by existing record(s): {}", fields.join(", "), conflicting_ids.join(", "))]
    ConstraintViolation {
        fields: Vec<String>,
        conflicting_ids: Vec<String>,
    },

    /// Unexpected internal failure, surfaced with context rather than swallowed
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RepoError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Errors raised while validating per-type configuration.
///
/// These occur once, during [`TypeHandler`](crate::handler::TypeHandler)
/// construction. No partially-valid handler is ever produced.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configured query has no filter template
    #[error("query missing 'queryFilter' field: {query_id}")]
    QueryMissingFilter { query_id: String },

    /// A configured command has no operation
    #[error("command missing 'operation' field: {command_id}")]
    CommandMissingOperation { command_id: String },

    /// A delete command has no filter
    #[error("command missing 'queryFilter' field: {command_id}")]
    CommandMissingFilter { command_id: String },

    /// A command names an operation this crate does not implement
    #[error("command operation '{operation}' unsupported: {command_id}")]
    UnsupportedCommandOperation {
        command_id: String,
        operation: String,
    },
}

// Result type aliases for convenience
pub type RepoResult<T> = Result<T, RepoError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
