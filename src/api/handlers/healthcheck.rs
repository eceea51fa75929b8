//! Liveness endpoint: pings the database and reports startup time.

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::SecondsFormat;

use crate::api::dto::{HealthResponse, STATUS_OK};
use crate::app_state::AppState;
use crate::error::HandlerError;

/// `GET <HEALTHCHECK_PATH>` — database liveness.
///
/// # Errors
///
/// Returns [`HandlerError`] (plain-text `500`) when the probe fails or the
/// body cannot be serialized.
pub async fn healthcheck_handler(State(state): State<AppState>) -> Result<Response, HandlerError> {
    state.probe.probe().await.map_err(HandlerError::Probe)?;

    let body = HealthResponse {
        db_available: true,
        startup_time: state
            .startup_time
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        status: STATUS_OK.to_string(),
    };
    let bytes = serde_json::to_vec(&body).map_err(HandlerError::Serialize)?;

    Ok(([(header::CONTENT_TYPE, "application/json")], bytes).into_response())
}

/// Liveness router answering every path it is given.
///
/// The configured path is matched by the dispatcher, so it is never parsed
/// as an axum route pattern.
pub fn routes() -> Router<AppState> {
    Router::new().fallback(get(healthcheck_handler))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use tower::ServiceExt;

    use crate::error::DatabaseError;
    use crate::persistence::LivenessProbe;
    use crate::service::ImageService;
    use crate::config::ImagesConfig;

    #[derive(Debug)]
    struct StubProbe {
        healthy: AtomicBool,
    }

    #[async_trait]
    impl LivenessProbe for StubProbe {
        async fn probe(&self) -> Result<(), DatabaseError> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(DatabaseError::Probe(sqlx::Error::PoolTimedOut))
            }
        }
    }

    fn make_state(healthy: bool) -> AppState {
        AppState {
            probe: Arc::new(StubProbe {
                healthy: AtomicBool::new(healthy),
            }),
            images: Arc::new(ImageService::new(Arc::new(ImagesConfig {
                timeout: Duration::from_secs(1),
            }))),
            startup_time: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).single().unwrap_or_default(),
            rpc_timeout: Duration::from_secs(1),
        }
    }

    async fn get_body(router: Router, uri: &str) -> (StatusCode, String) {
        let Ok(request) = Request::builder().uri(uri).body(Body::empty()) else {
            panic!("valid request");
        };
        let Ok(response) = router.oneshot(request).await;
        let status = response.status();
        let Ok(bytes) = to_bytes(response.into_body(), 64 * 1024).await else {
            panic!("readable body");
        };
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[tokio::test]
    async fn healthy_probe_returns_ok_json() {
        let router = routes().with_state(make_state(true));
        let (status, body) = get_body(router, "/healthz").await;
        assert_eq!(status, StatusCode::OK);

        let Ok(json) = serde_json::from_str::<serde_json::Value>(&body) else {
            panic!("json body: {body}");
        };
        assert_eq!(json["db_available"], true);
        assert_eq!(json["status"], "OK");
        assert_eq!(json["startup_time"], "2024-05-01T12:30:00Z");
    }

    #[tokio::test]
    async fn failing_probe_returns_plain_text_500() {
        let router = routes().with_state(make_state(false));
        let (status, body) = get_body(router, "/healthz").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.starts_with("unable to ping database"));
        assert!(serde_json::from_str::<serde_json::Value>(&body).is_err());
    }

    #[tokio::test]
    async fn any_path_is_answered() {
        let router = routes().with_state(make_state(true));
        for path in ["/health/", "/health/db", "/:health", "/a/*x"] {
            let (status, _) = get_body(router.clone(), path).await;
            assert_eq!(status, StatusCode::OK, "{path}");
        }
    }

    #[tokio::test]
    async fn non_get_is_method_not_allowed() {
        let router = routes().with_state(make_state(true));
        let Ok(request) = Request::builder()
            .method("POST")
            .uri("/healthz")
            .body(Body::empty())
        else {
            panic!("valid request");
        };
        let Ok(response) = router.oneshot(request).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
