//! HTTP proxying for the `/api` prefix.
//!
//! Requests are forwarded to the backend origin with the full path preserved.
//! The inbound `Host` header is dropped so the upstream client derives it
//! from the target URL, which is what the backend deployment expects.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use tracing::{debug, error};

use crate::server::ProxyState;

/// Cap on buffered request bodies.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Request headers that must not be forwarded upstream. `host` and
/// `content-length` are recalculated by the client; the rest are hop-by-hop.
fn skip_request_header(name: &str) -> bool {
    matches!(
        name,
        "host" | "content-length" | "transfer-encoding" | "connection" | "upgrade"
    )
}

/// Response headers that must not be copied back; axum sets these itself for
/// the rebuilt body.
fn skip_response_header(name: &str) -> bool {
    matches!(name, "content-length" | "transfer-encoding" | "connection")
}

/// Forward an `/api` request to the backend and relay the response.
pub async fn api_proxy(
    State(state): State<ProxyState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let path = uri.path();
    let target_url = match state.config.target_url(path, uri.query()) {
        Ok(url) => url.to_string(),
        Err(error) => {
            error!("Invalid backend target URL: {error}");
            return (StatusCode::BAD_GATEWAY, "Invalid backend target URL").into_response();
        }
    };

    debug!(
        method = %method,
        path = %path,
        target_url = %target_url,
        "Proxying API request"
    );

    let mut request_builder = state.client.request(method, &target_url);

    for (name, value) in headers.iter() {
        if skip_request_header(&name.as_str().to_lowercase()) {
            continue;
        }
        if let Ok(header_value) = value.to_str() {
            request_builder = request_builder.header(name.as_str(), header_value);
        }
    }

    let body_bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "Failed to read request body");
            return (StatusCode::BAD_REQUEST, "Failed to read request body").into_response();
        }
    };
    if !body_bytes.is_empty() {
        request_builder = request_builder.body(body_bytes);
    }

    let start = std::time::Instant::now();

    let response = match request_builder.send().await {
        Ok(resp) => resp,
        Err(error) => {
            let elapsed = start.elapsed();
            error!(
                error = %error,
                elapsed_ms = elapsed.as_millis(),
                target_url = %target_url,
                "Backend request failed"
            );
            let message = if error.is_timeout() {
                format!("Backend request timed out after {}ms", elapsed.as_millis())
            } else if error.is_connect() {
                format!("Failed to connect to backend: {error}")
            } else {
                format!("Backend request failed: {error}")
            };
            return (StatusCode::BAD_GATEWAY, message).into_response();
        }
    };

    let status = response.status();
    debug!(
        status = status.as_u16(),
        elapsed_ms = start.elapsed().as_millis(),
        "Backend response received"
    );

    let is_sse = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("text/event-stream"))
        .unwrap_or(false);

    let mut builder = Response::builder().status(status);
    for (name, value) in response.headers() {
        if skip_response_header(&name.as_str().to_lowercase()) {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_bytes());
    }

    if is_sse {
        // Event streams must not be buffered; relay chunks as they arrive.
        debug!("Streaming SSE response");
        let body = Body::from_stream(response.bytes_stream());
        return builder
            .body(body)
            .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response());
    }

    match response.bytes().await {
        Ok(bytes) => builder
            .body(Body::from(bytes))
            .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response()),
        Err(error) => {
            error!(error = %error, "Failed to read backend response body");
            (StatusCode::BAD_GATEWAY, "Failed to read backend response").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_and_hop_by_hop_request_headers_are_dropped() {
        for name in ["host", "content-length", "transfer-encoding", "connection"] {
            assert!(skip_request_header(name), "{name} should be dropped");
        }
        assert!(!skip_request_header("content-type"));
        assert!(!skip_request_header("authorization"));
        assert!(!skip_request_header("x-request-id"));
    }

    #[test]
    fn framing_response_headers_are_dropped() {
        assert!(skip_response_header("content-length"));
        assert!(skip_response_header("transfer-encoding"));
        assert!(!skip_response_header("content-type"));
        assert!(!skip_response_header("set-cookie"));
    }
}
