//! Path-prefix dispatch of requests to mounted sub-routers.
//!
//! A prefix ending in `/` owns its whole subtree; any other prefix only
//! matches its exact path. When several prefixes match, the longest wins.
//! Requests nobody claims get `404 page not found`.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tower::ServiceExt;

use crate::error::DispatchError;

/// Body of the response for unclaimed paths.
pub const NOT_FOUND_BODY: &str = "404 page not found\n";

#[derive(Debug, Clone)]
struct Mount {
    prefix: String,
    router: Router,
}

impl Mount {
    fn matches(&self, path: &str) -> bool {
        if self.prefix.ends_with('/') {
            path.starts_with(&self.prefix)
        } else {
            path == self.prefix
        }
    }
}

/// Routes each request to the sub-router of the longest matching prefix.
///
/// Immutable once converted with [`Dispatcher::into_router`].
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    mounts: Vec<Mount>,
}

impl Dispatcher {
    /// Creates a dispatcher with nothing mounted.
    #[must_use]
    pub const fn new() -> Self {
        Self { mounts: Vec::new() }
    }

    /// Mounts `router` at `prefix`. The router sees the full request path.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidPrefix`] if `prefix` is not absolute
    /// and [`DispatchError::Duplicate`] if it is already mounted.
    pub fn mount(mut self, prefix: &str, router: Router) -> Result<Self, DispatchError> {
        if !prefix.starts_with('/') {
            return Err(DispatchError::InvalidPrefix(prefix.to_string()));
        }
        if self.mounts.iter().any(|m| m.prefix == prefix) {
            return Err(DispatchError::Duplicate(prefix.to_string()));
        }
        tracing::debug!(prefix, "mounted handler");
        self.mounts.push(Mount {
            prefix: prefix.to_string(),
            router,
        });
        Ok(self)
    }

    /// The prefix that would serve `path`, if any.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&str> {
        self.lookup(path).map(|m| m.prefix.as_str())
    }

    /// Number of mounted prefixes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    /// `true` when nothing is mounted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    fn lookup(&self, path: &str) -> Option<&Mount> {
        self.mounts
            .iter()
            .filter(|m| m.matches(path))
            .max_by_key(|m| m.prefix.len())
    }

    /// Freezes the dispatcher into a service-ready [`Router`].
    pub fn into_router(self) -> Router {
        Router::new()
            .fallback(dispatch)
            .with_state(Arc::new(self))
    }
}

async fn dispatch(State(dispatcher): State<Arc<Dispatcher>>, request: Request<Body>) -> Response {
    let Some(mount) = dispatcher.lookup(request.uri().path()) else {
        tracing::debug!(path = %request.uri().path(), "no handler");
        return (StatusCode::NOT_FOUND, NOT_FOUND_BODY).into_response();
    };
    let Ok(response) = mount.router.clone().oneshot(request).await;
    response
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    fn tagged(tag: &'static str) -> Router {
        Router::new().fallback(move || async move { tag })
    }

    fn make_dispatcher() -> Dispatcher {
        let Ok(dispatcher) = Dispatcher::new()
            .mount("/healthz", tagged("health"))
            .and_then(|d| d.mount("/twirp/", tagged("twirp")))
            .and_then(|d| d.mount("/twirp/images.Manage/", tagged("images")))
        else {
            panic!("valid mounts");
        };
        dispatcher
    }

    async fn fetch(router: Router, uri: &str) -> (StatusCode, String) {
        let Ok(request) = axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
        else {
            panic!("valid request");
        };
        let Ok(response) = router.oneshot(request).await;
        let status = response.status();
        let Ok(bytes) = to_bytes(response.into_body(), 64 * 1024).await else {
            panic!("readable body");
        };
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[test]
    fn exact_prefix_matches_only_itself() {
        let dispatcher = make_dispatcher();
        assert_eq!(dispatcher.resolve("/healthz"), Some("/healthz"));
        assert_eq!(dispatcher.resolve("/healthz/"), None);
        assert_eq!(dispatcher.resolve("/healthz/db"), None);
    }

    #[test]
    fn longest_subtree_prefix_wins() {
        let dispatcher = make_dispatcher();
        assert_eq!(
            dispatcher.resolve("/twirp/images.Manage/Fetch"),
            Some("/twirp/images.Manage/")
        );
        assert_eq!(dispatcher.resolve("/twirp/other.Service/Do"), Some("/twirp/"));
        assert_eq!(dispatcher.resolve("/twirp"), None);
        assert_eq!(dispatcher.resolve("/"), None);
    }

    #[test]
    fn duplicate_prefix_is_rejected() {
        let result = make_dispatcher().mount("/healthz", tagged("again"));
        assert_eq!(
            result.err(),
            Some(DispatchError::Duplicate("/healthz".to_string()))
        );
    }

    #[test]
    fn relative_prefix_is_rejected() {
        let result = Dispatcher::new().mount("healthz", tagged("health"));
        assert_eq!(
            result.err(),
            Some(DispatchError::InvalidPrefix("healthz".to_string()))
        );
    }

    #[tokio::test]
    async fn requests_reach_the_matching_router() {
        let router = make_dispatcher().into_router();
        assert_eq!(
            fetch(router.clone(), "/healthz").await,
            (StatusCode::OK, "health".to_string())
        );
        assert_eq!(
            fetch(router.clone(), "/twirp/images.Manage/Upload").await,
            (StatusCode::OK, "images".to_string())
        );
        assert_eq!(
            fetch(router, "/twirp/x").await,
            (StatusCode::OK, "twirp".to_string())
        );
    }

    #[tokio::test]
    async fn unclaimed_path_is_404() {
        let router = make_dispatcher().into_router();
        let (status, body) = fetch(router, "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, NOT_FOUND_BODY);
    }

    #[tokio::test]
    async fn empty_dispatcher_answers_404() {
        let dispatcher = Dispatcher::new();
        assert!(dispatcher.is_empty());
        let (status, _) = fetch(dispatcher.into_router(), "/anything").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
