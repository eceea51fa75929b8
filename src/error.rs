//! Error types for every component of the service.
//!
//! Startup errors ([`DatabaseError`], [`MigrationError`], [`ServerError::Bind`],
//! [`DispatchError`], [`LoggingError`] and
//! [`ConfigError`](crate::config::ConfigError)) are fatal and bubble up to
//! `main`, which is the only place allowed to turn them into an exit code.
//! Request-scoped errors ([`HandlerError`], [`TwirpError`]) become a
//! response for that one caller and never affect other requests.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Failure to reach or probe the database.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// The pool could not be created or its first liveness probe failed.
    #[error("unable to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    /// A liveness probe failed on an established pool.
    #[error("unable to ping database: {0}")]
    Probe(#[source] sqlx::Error),
}

/// Failure while loading or applying a migration set.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// The migration source could not be read or is inconsistent.
    #[error("invalid migration source: {0}")]
    Source(String),

    /// The recorded cut point does not match the migration set.
    #[error("applied migrations diverge from the migration set: {0}")]
    Diverged(String),

    /// Reading or preparing the bookkeeping table failed.
    #[error("migration bookkeeping failed: {0}")]
    Store(#[source] sqlx::Error),

    /// A single step failed; earlier steps in this run stay applied.
    #[error("migration {version} ({name}) failed to migrate {direction}: {source}")]
    Step {
        /// Version of the failing step.
        version: i64,
        /// Name of the failing step.
        name: String,
        /// `up` or `down`.
        direction: &'static str,
        /// Underlying database error.
        #[source]
        source: sqlx::Error,
    },
}

/// Failure of the HTTP server lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("unable to listen on {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: std::net::SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// In-flight connections outlived the grace period and were closed.
    #[error("graceful shutdown exceeded {grace:?}; closed {remaining} connection(s)")]
    ShutdownTimeout {
        /// Grace period that elapsed.
        grace: Duration,
        /// Connections still open when the deadline passed.
        remaining: usize,
    },

    /// The accept task failed or panicked.
    #[error("unable to shutdown gracefully: {0}")]
    Internal(String),
}

impl ServerError {
    /// `true` for errors that should not fail the process on their own.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::ShutdownTimeout { .. })
    }
}

/// Failure while building the path dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The same prefix was mounted twice.
    #[error("prefix {0:?} is already mounted")]
    Duplicate(String),

    /// Prefixes must be absolute paths.
    #[error("prefix {0:?} must start with '/'")]
    InvalidPrefix(String),
}

/// Failure to install the log subscriber.
#[derive(Debug, thiserror::Error)]
#[error("unable to initialize logging: {0}")]
pub struct LoggingError(pub String);

/// Per-request failure of a plain HTTP handler.
///
/// Rendered as `500 Internal Server Error` with a plain-text body.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The liveness probe failed.
    #[error("unable to ping database: {0}")]
    Probe(#[source] DatabaseError),

    /// The response body could not be serialized.
    #[error("problem marshaling response: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

/// Error codes of the Twirp RPC protocol used by the images service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TwirpCode {
    /// No such method, or wrong HTTP method.
    BadRoute,
    /// The request body could not be decoded.
    Malformed,
    /// The call ran past its deadline.
    DeadlineExceeded,
    /// Anything else.
    Internal,
}

impl TwirpCode {
    /// HTTP status associated with the code.
    #[must_use]
    pub const fn status_code(self) -> StatusCode {
        match self {
            Self::BadRoute => StatusCode::NOT_FOUND,
            Self::Malformed => StatusCode::BAD_REQUEST,
            Self::DeadlineExceeded => StatusCode::REQUEST_TIMEOUT,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// RPC error rendered as a Twirp JSON body: `{"code": "...", "msg": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("twirp error {code:?}: {msg}")]
pub struct TwirpError {
    /// Machine-readable code.
    pub code: TwirpCode,
    /// Human-readable message.
    pub msg: String,
}

impl TwirpError {
    /// Creates an error with the given code and message.
    #[must_use]
    pub fn new(code: TwirpCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
        }
    }
}

impl IntoResponse for TwirpError {
    fn into_response(self) -> Response {
        if self.code == TwirpCode::Internal {
            tracing::error!(msg = %self.msg, "rpc failed");
        } else {
            tracing::debug!(code = ?self.code, msg = %self.msg, "rpc rejected");
        }
        (self.code.status_code(), axum::Json(self)).into_response()
    }
}
