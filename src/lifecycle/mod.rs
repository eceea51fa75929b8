//! Process lifecycle: serving, parking on a stop signal, draining.
//!
//! # Data Flow
//! ```text
//! Server::start:
//!     Bind listener → spawn accept task → ServerHandle (Running)
//!
//! Parking (shutdown.rs, signals.rs):
//!     SIGINT/SIGTERM → ShutdownToken::trigger → wait_for_shutdown returns
//!
//! ServerHandle::shutdown:
//!     Draining → stop accepting → graceful close per connection
//!     → all done within grace: Ok, Stopped
//!     → deadline passed: abort remaining, ShutdownTimeout, Stopped
//! ```

pub mod server;
pub mod shutdown;
pub mod signals;

pub use server::{Server, ServerHandle, ServerState, ServerTimeouts};
pub use shutdown::ShutdownToken;
