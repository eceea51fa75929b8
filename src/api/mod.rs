//! HTTP surface: the liveness endpoint, the `images.Manage` RPC service,
//! and the [`Dispatcher`] that routes between them by path prefix.

pub mod dispatcher;
pub mod dto;
pub mod handlers;

pub use dispatcher::Dispatcher;

use crate::app_state::AppState;
use crate::error::DispatchError;

/// Mounts the healthcheck at `healthcheck_path` and the RPC service under
/// its Twirp prefix.
///
/// # Errors
///
/// Returns [`DispatchError`] if `healthcheck_path` is not absolute or
/// collides with the RPC prefix.
pub fn build_dispatcher(
    state: AppState,
    healthcheck_path: &str,
) -> Result<Dispatcher, DispatchError> {
    Dispatcher::new()
        .mount(
            healthcheck_path,
            handlers::healthcheck::routes().with_state(state.clone()),
        )?
        .mount(
            handlers::images::MANAGE_PATH_PREFIX,
            handlers::images::routes().with_state(state),
        )
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use tower::ServiceExt;

    use crate::config::ImagesConfig;
    use crate::error::DatabaseError;
    use crate::persistence::LivenessProbe;
    use crate::service::ImageService;

    #[derive(Debug)]
    struct AlwaysUp;

    #[async_trait]
    impl LivenessProbe for AlwaysUp {
        async fn probe(&self) -> Result<(), DatabaseError> {
            Ok(())
        }
    }

    fn make_state() -> AppState {
        AppState {
            probe: Arc::new(AlwaysUp),
            images: Arc::new(ImageService::new(Arc::new(ImagesConfig {
                timeout: Duration::from_secs(1),
            }))),
            startup_time: Utc::now(),
            rpc_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn mounts_healthcheck_and_rpc() {
        let Ok(dispatcher) = build_dispatcher(make_state(), "/healthz") else {
            panic!("valid dispatcher");
        };
        assert_eq!(dispatcher.len(), 2);
        assert_eq!(dispatcher.resolve("/healthz"), Some("/healthz"));
        assert_eq!(
            dispatcher.resolve("/twirp/images.Manage/Fetch"),
            Some(handlers::images::MANAGE_PATH_PREFIX)
        );
    }

    #[test]
    fn healthcheck_path_with_route_syntax_is_mounted_literally() {
        for path in ["/:health", "/health{", "/a/*x", "/status/{id}/"] {
            let Ok(dispatcher) = build_dispatcher(make_state(), path) else {
                panic!("valid dispatcher for {path}");
            };
            assert_eq!(dispatcher.resolve(path), Some(path));
        }
    }

    #[tokio::test]
    async fn healthcheck_path_with_route_syntax_is_served() {
        for path in ["/:health", "/a/*x"] {
            let Ok(dispatcher) = build_dispatcher(make_state(), path) else {
                panic!("valid dispatcher for {path}");
            };
            let router = dispatcher.into_router();

            let Ok(request) = Request::builder().uri(path).body(Body::empty()) else {
                panic!("valid request");
            };
            let Ok(response) = router.clone().oneshot(request).await;
            assert_eq!(response.status(), StatusCode::OK, "{path}");

            let Ok(request) = Request::builder().uri("/health").body(Body::empty()) else {
                panic!("valid request");
            };
            let Ok(response) = router.oneshot(request).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
        }
    }

    #[test]
    fn healthcheck_on_rpc_prefix_is_rejected() {
        let result = build_dispatcher(make_state(), handlers::images::MANAGE_PATH_PREFIX);
        assert!(matches!(result, Err(DispatchError::Duplicate(_))));
    }
}
