//! HTTP server with bounded graceful shutdown.
//!
//! # Responsibilities
//! - Bind the listener before anything is spawned
//! - Serve each connection on its own task (HTTP/1.1 and HTTP/2)
//! - Apply request tracing and the per-request timeout
//! - Drain connections within a grace period, then force-close the rest

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::shutdown::ShutdownToken;
use crate::error::ServerError;

/// Pause after a failed `accept` so a persistent error does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Time limits applied by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerTimeouts {
    /// Deadline for producing a response; expiry answers `408`.
    pub request: Duration,
    /// Deadline for receiving HTTP/1 request headers.
    pub header_read: Duration,
    /// How long shutdown waits for in-flight connections.
    pub grace: Duration,
}

impl ServerTimeouts {
    /// Uses `timeout` for every limit.
    #[must_use]
    pub const fn uniform(timeout: Duration) -> Self {
        Self {
            request: timeout,
            header_read: timeout,
            grace: timeout,
        }
    }
}

/// Lifecycle state of a [`ServerHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Accepting and serving connections.
    Running,
    /// No longer accepting; waiting for in-flight connections.
    Draining,
    /// Listener closed and every connection finished or closed.
    Stopped,
}

/// Entry point for starting the HTTP server.
#[derive(Debug, Clone, Copy)]
pub struct Server;

impl Server {
    /// Binds `addr` and starts serving `router` in the background.
    ///
    /// Returns once the listener is bound; no request is handled before
    /// that.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn start(
        router: Router,
        addr: SocketAddr,
        timeouts: ServerTimeouts,
    ) -> Result<ServerHandle, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let app = with_middleware(router, timeouts.request);
        let stop = ShutdownToken::new();
        let active = Arc::new(AtomicUsize::new(0));
        let accepted = Arc::new(AtomicUsize::new(0));
        let (state, _) = watch::channel(ServerState::Running);

        let accept = tokio::spawn(accept_loop(
            listener,
            app,
            timeouts,
            stop.clone(),
            Arc::clone(&active),
            Arc::clone(&accepted),
        ));

        tracing::info!(address = %local_addr, "HTTP server listening");
        Ok(ServerHandle {
            local_addr,
            state,
            stop,
            active,
            accepted,
            accept: Some(accept),
        })
    }
}

/// Request tracing and the per-request deadline.
#[allow(deprecated)]
fn with_middleware(router: Router, request_timeout: Duration) -> Router {
    router
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}

/// Handle to a running server.
///
/// Dropping the handle without calling [`shutdown`](Self::shutdown) aborts
/// the server and every open connection.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    state: watch::Sender<ServerState>,
    stop: ShutdownToken,
    active: Arc<AtomicUsize>,
    accepted: Arc<AtomicUsize>,
    accept: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Connections currently open.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Connections accepted since start.
    #[must_use]
    pub fn accepted_connections(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Parks the caller until `token` is triggered.
    pub async fn wait_for_shutdown(&self, token: &ShutdownToken) {
        token.cancelled().await;
        tracing::info!(address = %self.local_addr, "shutdown requested");
    }

    /// Stops accepting and drains open connections within `grace`.
    ///
    /// Calling it again after it returned is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::ShutdownTimeout`] if connections were still
    /// open at the deadline (they are closed forcibly), or
    /// [`ServerError::Internal`] if the accept task failed.
    pub async fn shutdown(&mut self, grace: Duration) -> Result<(), ServerError> {
        let Some(mut accept) = self.accept.take() else {
            return Ok(());
        };

        self.state.send_replace(ServerState::Draining);
        tracing::info!(
            grace = ?grace,
            active_connections = self.active_connections(),
            "draining connections"
        );
        self.stop.trigger();

        let result = match tokio::time::timeout(grace, &mut accept).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ServerError::Internal(e.to_string())),
            Err(_) => {
                let remaining = self.active_connections();
                accept.abort();
                // Dropping the accept task drops its JoinSet, aborting every
                // connection task.
                let _ = accept.await;
                Err(ServerError::ShutdownTimeout { grace, remaining })
            }
        };

        self.state.send_replace(ServerState::Stopped);
        match &result {
            Ok(()) => tracing::info!("HTTP server stopped"),
            Err(e) => tracing::warn!(error = %e, "HTTP server stopped"),
        }
        result
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(accept) = self.accept.take() {
            accept.abort();
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    app: Router,
    timeouts: ServerTimeouts,
    stop: ShutdownToken,
    active: Arc<AtomicUsize>,
    accepted: Arc<AtomicUsize>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            // Stop wins over a ready accept once draining has begun.
            () = stop.cancelled() => break,
            incoming = listener.accept() => match incoming {
                Ok((stream, peer)) => {
                    accepted.fetch_add(1, Ordering::SeqCst);
                    let guard = ConnectionGuard::new(&active, peer);
                    connections.spawn(serve_connection(
                        stream,
                        app.clone(),
                        timeouts.header_read,
                        stop.clone(),
                        guard,
                    ));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                log_join(joined);
            }
        }
    }

    drop(listener);
    while let Some(joined) = connections.join_next().await {
        log_join(joined);
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined
        && e.is_panic()
    {
        tracing::error!(error = %e, "connection task panicked");
    }
}

async fn serve_connection(
    stream: TcpStream,
    app: Router,
    header_read_timeout: Duration,
    stop: ShutdownToken,
    guard: ConnectionGuard,
) {
    let mut builder = auto::Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(header_read_timeout);

    let service = TowerToHyperService::new(app);
    let conn = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        () = stop.cancelled() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };
    if let Err(e) = result {
        tracing::debug!(peer = %guard.peer, error = %e, "connection closed with error");
    }
}

/// Counts a connection as open for its task's lifetime, including abort.
#[derive(Debug)]
struct ConnectionGuard {
    active: Arc<AtomicUsize>,
    peer: SocketAddr,
}

impl ConnectionGuard {
    fn new(active: &Arc<AtomicUsize>, peer: SocketAddr) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(peer = %peer, "connection opened");
        Self {
            active: Arc::clone(active),
            peer,
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(peer = %self.peer, "connection closed");
    }
}
