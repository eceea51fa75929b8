//! Shared application state injected into all Axum handlers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::persistence::LivenessProbe;
use crate::service::ImageManager;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Database liveness probe used by the healthcheck.
    pub probe: Arc<dyn LivenessProbe>,
    /// Implementation of the `images.Manage` RPC service.
    pub images: Arc<dyn ImageManager>,
    /// When the process started serving.
    pub startup_time: DateTime<Utc>,
    /// Deadline for a single RPC call.
    pub rpc_timeout: Duration,
}
