//! Liveness endpoint response.

use serde::Serialize;

/// Status string reported when every dependency answers.
pub const STATUS_OK: &str = "OK";

/// Body of a successful liveness check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    /// Whether the database answered the probe.
    pub db_available: bool,
    /// Process start time, RFC 3339 in UTC.
    pub startup_time: String,
    /// Always [`STATUS_OK`] in a successful response.
    pub status: String,
}
