//! `images.Manage` RPC endpoints in Twirp JSON framing.
//!
//! Calls are `POST /twirp/images.Manage/<Method>` with a JSON [`Image`]
//! body. Anything else under the prefix is answered with a Twirp
//! `bad_route` error.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, header};
use axum::routing::any;
use axum::{Json, Router};

use crate::api::dto::Image;
use crate::app_state::AppState;
use crate::error::{TwirpCode, TwirpError};

/// Path prefix shared by every `images.Manage` method.
pub const MANAGE_PATH_PREFIX: &str = "/twirp/images.Manage/";

/// Methods of the `images.Manage` service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManageMethod {
    /// `Fetch(Image) -> Image`.
    Fetch,
    /// `Upload(Image) -> Image`.
    Upload,
}

impl ManageMethod {
    /// Resolves a method name from the request path.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Fetch" => Some(Self::Fetch),
            "Upload" => Some(Self::Upload),
            _ => None,
        }
    }
}

/// `POST /twirp/images.Manage/{method}` — dispatch one RPC call.
///
/// # Errors
///
/// Returns a [`TwirpError`] for unknown methods, non-POST requests,
/// undecodable bodies, and calls that outlive the RPC deadline.
pub async fn rpc_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Image>, TwirpError> {
    if method != Method::POST {
        return Err(TwirpError::new(
            TwirpCode::BadRoute,
            format!("unsupported method {method} (only POST is allowed)"),
        ));
    }
    let Some(call) = ManageMethod::from_name(&name) else {
        return Err(bad_route(&name));
    };
    if let Some(content_type) = headers.get(header::CONTENT_TYPE)
        && !content_type
            .to_str()
            .is_ok_and(|v| v.starts_with("application/json"))
    {
        return Err(TwirpError::new(
            TwirpCode::BadRoute,
            format!("unexpected Content-Type: {content_type:?}"),
        ));
    }

    let image: Image = serde_json::from_slice(&body).map_err(|e| {
        TwirpError::new(
            TwirpCode::Malformed,
            format!("the json request could not be decoded: {e}"),
        )
    })?;

    let images = std::sync::Arc::clone(&state.images);
    let result = tokio::time::timeout(state.rpc_timeout, async move {
        match call {
            ManageMethod::Fetch => images.fetch(image).await,
            ManageMethod::Upload => images.upload(image).await,
        }
    })
    .await
    .map_err(|_| {
        TwirpError::new(
            TwirpCode::DeadlineExceeded,
            format!("{name} did not complete within {:?}", state.rpc_timeout),
        )
    })??;

    Ok(Json(result))
}

/// Answers paths under the prefix that are not a method.
async fn fallback_handler(uri: axum::http::Uri) -> TwirpError {
    bad_route(uri.path())
}

fn bad_route(target: &str) -> TwirpError {
    TwirpError::new(
        TwirpCode::BadRoute,
        format!("no handler for path {target:?}"),
    )
}

/// RPC routes, mounted under [`MANAGE_PATH_PREFIX`].
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(&format!("{MANAGE_PATH_PREFIX}{{method}}"), any(rpc_handler))
        .fallback(fallback_handler)
}
