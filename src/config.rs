//! Process-wide configuration, fixed at startup.

use std::path::PathBuf;

use anyhow::{bail, Context};
use url::Url;

/// Default listen port when `PORT` is not set.
pub const DEFAULT_PORT: u16 = 8080;

/// Production backend deployment, used when `BACKEND_URL` is not set.
pub const DEFAULT_BACKEND_URL: &str =
    "https://content-generator-backend-969486604732.us-central1.run.app";

/// Directory containing the built single-page app, relative to the working
/// directory unless overridden.
pub const DEFAULT_STATIC_DIR: &str = "build";

/// Immutable server configuration. Built once in `main` (or by tests) and
/// shared behind an `Arc` for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Port to listen on. Port 0 asks the OS for an ephemeral port.
    pub port: u16,
    /// Backend origin (scheme + host, no trailing slash).
    pub backend_url: String,
    /// Root directory of the built SPA, including `index.html`.
    pub static_dir: PathBuf,
}

impl ProxyConfig {
    /// Validate and normalize the backend origin.
    pub fn new(
        port: u16,
        backend_url: impl Into<String>,
        static_dir: impl Into<PathBuf>,
    ) -> anyhow::Result<Self> {
        let backend_url = backend_url.into().trim_end_matches('/').to_string();
        let parsed = Url::parse(&backend_url)
            .with_context(|| format!("invalid backend URL: {backend_url}"))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => bail!("backend URL must be http or https, got {other}://"),
        }
        if parsed.host_str().is_none() {
            bail!("backend URL has no host: {backend_url}");
        }
        Ok(Self {
            port,
            backend_url,
            static_dir: static_dir.into(),
        })
    }

    /// Build the backend URL for a proxied HTTP request, preserving the
    /// request path and query.
    pub fn target_url(&self, path: &str, query: Option<&str>) -> Result<Url, url::ParseError> {
        build_target_url(&self.backend_url, path, query)
    }

    /// Build the backend URL for a proxied WebSocket connection. Same as
    /// `target_url` with the scheme substituted `http`->`ws`, `https`->`wss`.
    pub fn ws_target_url(&self, path: &str, query: Option<&str>) -> Result<Url, url::ParseError> {
        let mut url = build_target_url(&self.backend_url, path, query)?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        // set_scheme only errs for non-special schemes, which new() rejects.
        let _ = url.set_scheme(scheme);
        Ok(url)
    }
}

fn build_target_url(base: &str, path: &str, query: Option<&str>) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base)?;
    let trimmed_path = path.trim_start_matches('/');
    let new_path = if trimmed_path.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", trimmed_path)
    };
    url.set_path(&new_path);
    url.set_query(query);
    Ok(url)
}
