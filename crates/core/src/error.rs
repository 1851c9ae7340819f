//! Error types for the gateway domain layer.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`SourceError`] - Data source adapter errors
//! - [`QueryError`] - Query resolver errors (validation + source)
//! - [`HubError`] - Event fan-out hub errors
//! - [`SessionError`] - Subscription session lifecycle errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Source Errors
// =============================================================================

/// Errors raised by a [`crate::ports::TelemetrySource`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Requested block range is empty or larger than the adapter allows.
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Metric key is not served by this source.
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    /// Backing store could not be reached. Callers may retry.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Backing store answered with something we could not decode.
    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),

    /// A resume cursor does not point inside the sequence it claims.
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),
}

// =============================================================================
// Query Errors
// =============================================================================

/// Errors returned by the query resolver layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    /// An argument failed validation. The source was not called.
    #[error("Invalid argument `{field}`: {message}")]
    Validation {
        /// Name of the offending argument.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// The data source rejected or failed the request.
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl QueryError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        QueryError::Validation {
            field,
            message: message.into(),
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::Validation { .. } => "VALIDATION_ERROR",
            QueryError::Source(SourceError::InvalidRange(_)) => "INVALID_RANGE",
            QueryError::Source(SourceError::UnknownMetric(_)) => "UNKNOWN_METRIC",
            QueryError::Source(SourceError::UpstreamUnavailable(_)) => "UPSTREAM_UNAVAILABLE",
            QueryError::Source(SourceError::InvalidResponse(_)) => "INTERNAL",
            QueryError::Source(SourceError::InvalidCursor(_)) => "VALIDATION_ERROR",
        }
    }
}

// =============================================================================
// Hub Errors
// =============================================================================

/// Event hub errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HubError {
    /// The hub has been shut down and accepts no new subscribers.
    #[error("Event hub is shut down")]
    Closed,

    /// A subscription was requested with no topic.
    #[error("Subscription requires at least one topic")]
    NoTopics,
}

// =============================================================================
// Session Errors
// =============================================================================

/// Subscription session lifecycle errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// No session with this id (never registered, or already closed).
    #[error("Session not found: {0}")]
    NotFound(u64),

    /// Transition not allowed from the session's current state.
    #[error("Session {id} cannot {action} while {state}")]
    InvalidState {
        id: u64,
        action: &'static str,
        state: &'static str,
    },

    /// Hub refused the subscription.
    #[error("Hub error: {0}")]
    Hub(#[from] HubError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for data source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Result type for hub operations.
pub type HubResult<T> = Result<T, HubError>;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
