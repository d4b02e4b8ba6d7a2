//! frontend-proxy binary entry point.
//!
//! Serves the built single-page app and forwards `/api` and `/ws` traffic to
//! the backend deployment.

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use frontend_proxy::config::{DEFAULT_BACKEND_URL, DEFAULT_PORT, DEFAULT_STATIC_DIR};
use frontend_proxy::{FrontendServer, ProxyConfig};

/// Front-end edge server for the content generator web app.
#[derive(Parser, Debug)]
#[command(name = "frontend-proxy")]
#[command(about = "Serves the built SPA and proxies /api and /ws to the backend")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Backend origin to proxy /api and /ws requests to
    #[arg(long, env = "BACKEND_URL", default_value = DEFAULT_BACKEND_URL)]
    backend_url: String,

    /// Directory containing the built single-page app
    #[arg(long, env = "STATIC_DIR", default_value = DEFAULT_STATIC_DIR)]
    static_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::default().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "frontend_proxy=info,hyper=warn".into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .init();

    let config = ProxyConfig::new(args.port, &args.backend_url, args.static_dir)?;

    if !config.static_dir.is_dir() {
        warn!(
            static_dir = %config.static_dir.display(),
            "static asset directory does not exist; only /api and /ws will be served"
        );
    }

    let server = FrontendServer::start(config.clone()).await?;
    info!(
        addr = %server.addr,
        static_dir = %config.static_dir.display(),
        "Frontend server running"
    );
    info!(backend_url = %config.backend_url, "Proxying API requests to backend");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    Ok(())
}
