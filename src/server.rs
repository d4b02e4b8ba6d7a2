//! Router assembly and server lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::any;
use axum::Router;
use reqwest::Client;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::api_proxy::api_proxy;
use crate::config::ProxyConfig;
use crate::static_files::spa_fallback;
use crate::ws_proxy::ws_proxy;

/// Shared state for all request handlers.
#[derive(Clone)]
pub struct ProxyState {
    /// HTTP client for forwarding `/api` requests.
    pub client: Client,
    /// Startup configuration.
    pub config: Arc<ProxyConfig>,
}

impl ProxyState {
    /// Create handler state with a shared upstream client.
    ///
    /// The client uses a 10 second connect timeout so an unreachable backend
    /// surfaces a gateway error quickly, and no overall request timeout so
    /// long-running generation requests and SSE streams pass through intact.
    pub fn new(config: ProxyConfig) -> Self {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build upstream client with custom settings: {e}, using default");
                Client::new()
            });
        Self {
            client,
            config: Arc::new(config),
        }
    }
}

/// Build the request router. Routes are matched in a fixed order: the `/api`
/// prefix, then the `/ws` prefix, then static files with the SPA fallback.
pub fn build_router(state: ProxyState) -> Router {
    Router::new()
        .route("/api", any(api_proxy))
        .route("/api/{*path}", any(api_proxy))
        .route("/ws", any(ws_proxy))
        .route("/ws/{*path}", any(ws_proxy))
        .fallback(spa_fallback)
        .with_state(state)
}

/// Running server handle.
pub struct FrontendServer {
    /// Address the server is listening on.
    pub addr: SocketAddr,
    /// Shutdown signal sender.
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl FrontendServer {
    /// Bind the configured port and start serving in a background task.
    pub async fn start(config: ProxyConfig) -> anyhow::Result<Self> {
        let port = config.port;
        let state = ProxyState::new(config);
        let app = build_router(state);

        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await?;
        let actual_addr = listener.local_addr()?;

        info!(addr = %actual_addr, "frontend proxy listening");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Ok(Self {
            addr: actual_addr,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Stop the server.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for FrontendServer {
    fn drop(&mut self) {
        self.stop();
    }
}
