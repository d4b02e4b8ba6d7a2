//! Front-end edge server for the content generator web app.
//!
//! Serves the pre-built single-page application from a local directory and
//! forwards traffic to the backend deployment:
//!
//! - `/api/*` is proxied over plain HTTP with the `Host` header rewritten to
//!   the backend origin.
//! - `/ws/*` is proxied as a WebSocket upgrade to the backend with the scheme
//!   swapped to `ws`/`wss`, relaying frames in both directions until either
//!   side closes.
//! - Any other path is answered from the static asset directory, falling back
//!   to `index.html` so client-side routing can take over.

pub mod api_proxy;
pub mod config;
pub mod server;
pub mod static_files;
pub mod ws_proxy;

pub use config::ProxyConfig;
pub use server::{build_router, FrontendServer, ProxyState};
