//! Request interception
//!
//! Converts incoming HTTP requests into worker fetches. Absolute-form
//! request targets (forward proxy use) are taken as-is; origin-form
//! targets are resolved against the worker's origin.

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderMap, Uri, header},
    response::{IntoResponse, Response},
};
use shell_cache_core::Interception;
use shell_cache_fetch::{FetchRequest, FetchResponse, already_forwarded};
use tracing::{debug, warn};
use url::Url;

use super::MAX_REQUEST_BODY;
use crate::error::ApiError;
use crate::state::AppState;

/// Connection-scoped headers that must not be forwarded
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Fallback handler: offer every request to the worker
pub(super) async fn intercept(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();
    let url = target_url(&parts.uri, state.worker.origin())?;

    // Our own outgoing fetch came back to us: the origin points at this host
    if already_forwarded(&parts.headers) {
        warn!("Request loop detected for {} {}", parts.method, url);
        metrics::counter!("shell_cache_requests_total", "outcome" => "loop").increment(1);
        return Err(ApiError::LoopDetected(url.to_string()));
    }

    let body = to_bytes(body, MAX_REQUEST_BODY)
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read request body: {}", e)))?;

    let fetch = FetchRequest::new(parts.method, url)
        .with_headers(forwardable_headers(&parts.headers))
        .with_body(body);

    let response = match state.worker.fetch(&fetch).await? {
        Interception::Respond(response) => {
            metrics::counter!("shell_cache_requests_total", "outcome" => "intercepted").increment(1);
            response
        }
        Interception::Passthrough => {
            debug!("Forwarding {} {} untouched", fetch.method, fetch.url);
            metrics::counter!("shell_cache_requests_total", "outcome" => "passthrough").increment(1);
            state.worker.passthrough(&fetch).await?
        }
    };

    Ok(into_http_response(response))
}

/// Resolve the request target to an absolute URL
fn target_url(uri: &Uri, origin: &Url) -> Result<Url, ApiError> {
    if uri.scheme().is_some() && uri.authority().is_some() {
        return Url::parse(&uri.to_string())
            .map_err(|e| ApiError::BadRequest(format!("Invalid request target {}: {}", uri, e)));
    }

    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    // `join` would read `//host/x` as a scheme-relative URL for another host
    if path.starts_with("//") {
        return Err(ApiError::BadRequest(format!(
            "Invalid request path {}: must not start with //",
            path
        )));
    }
    origin
        .join(path)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request path {}: {}", path, e)))
}

/// Request headers minus hop-by-hop headers and `Host`, which the client
/// sets for the real destination
fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = headers.clone();
    forwarded.remove(header::HOST);
    for name in HOP_BY_HOP {
        forwarded.remove(*name);
    }
    forwarded
}

fn into_http_response(response: FetchResponse) -> Response {
    let mut headers = response.headers;
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
    // The body is complete, so the length is recomputed on the way out
    headers.remove(header::CONTENT_LENGTH);

    let mut http_response = Body::from(response.body).into_response();
    *http_response.status_mut() = response.status;
    http_response.headers_mut().extend(headers);
    http_response
}
