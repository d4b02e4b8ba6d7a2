//! Static asset serving with SPA fallback.
//!
//! Paths that resolve to a real file under the static root are served
//! verbatim. Everything else gets `index.html` with a 200 so the client-side
//! router can handle the path.

use std::path::Path;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

use crate::server::ProxyState;

/// Fallback handler for everything not matched by the `/api` and `/ws`
/// routes: static file lookup first, then the SPA entry document.
pub async fn spa_fallback(
    State(state): State<ProxyState>,
    method: Method,
    uri: Uri,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    }

    let path = uri.path().trim_start_matches('/');
    if !path.is_empty() {
        if let Some(response) = try_serve_file(&state.config.static_dir, path).await {
            return response;
        }
    }

    serve_index(&state.config.static_dir).await
}

/// Serve `path` from under `root` if it names an existing regular file.
/// Returns `None` when the path does not resolve to a file, which falls
/// through to the SPA entry document.
async fn try_serve_file(root: &Path, path: &str) -> Option<Response> {
    let root = root.canonicalize().ok()?;
    let requested = root.join(path);
    let canonical = requested.canonicalize().ok()?;

    if !canonical.starts_with(&root) {
        warn!(path = %path, "blocked static file access outside asset root");
        return Some((StatusCode::FORBIDDEN, "Forbidden").into_response());
    }
    if !canonical.is_file() {
        return None;
    }

    let contents = tokio::fs::read(&canonical).await.ok()?;
    let response = Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", content_type(&canonical))
        .header("Cache-Control", "public, max-age=3600")
        .body(Body::from(contents))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
    Some(response)
}

/// Serve the SPA entry document with a 200, regardless of the request path.
async fn serve_index(root: &Path) -> Response {
    let index_path = root.join("index.html");
    match tokio::fs::read(&index_path).await {
        Ok(contents) => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/html; charset=utf-8")
            .body(Body::from(contents))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(err) => {
            error!(
                path = %index_path.display(),
                error = %err,
                "SPA entry document missing"
            );
            (StatusCode::NOT_FOUND, "index.html not found").into_response()
        }
    }
}

fn content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("html") => "text/html; charset=utf-8",
        Some("js") | Some("mjs") => "application/javascript",
        Some("css") => "text/css",
        Some("json") | Some("map") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("webp") => "image/webp",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("wasm") => "application/wasm",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
