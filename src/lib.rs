//! # images-api
//!
//! HTTP service exposing the `images.Manage` RPC surface and a database
//! liveness endpoint, with a bounded graceful shutdown.
//!
//! ## Architecture
//!
//! ```text
//! main
//!     │
//!     ├── ConfigLoader (config/)       one barrier per module
//!     ├── logging                      JSON tracing subscriber
//!     ├── Database (persistence/)      PgPool, probe, migrations
//!     │
//!     ├── Dispatcher (api/)
//!     │     ├── HEALTHCHECK_PATH       → healthcheck handler → LivenessProbe
//!     │     └── /twirp/images.Manage/  → RPC handlers → ImageService
//!     │
//!     └── Server (lifecycle/)          accept loop, ShutdownToken, signals
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod persistence;
pub mod service;
