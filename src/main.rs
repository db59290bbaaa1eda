//! kai-guard
//!
//! The booking backend's security edge as a standalone service.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client request
//!        │
//!        ▼
//!   ┌──────────────────────── http::server ────────────────────────┐
//!   │ request id → trace → timeout → body limit → security headers │
//!   └──────────────┬───────────────────────────────┬───────────────┘
//!                  │                               │
//!     /api/auth/login, /register          /api/auth/{me,csrf-token,logout}
//!                  │                               │
//!        security::rate_limit           http::middleware::require_session
//!                  │                               │
//!                  │                    http::middleware::require_csrf
//!                  ▼                               ▼
//!             auth::handlers ◀──── users::UserDirectory
//!
//!   Background: security::sweeper (sessions 5m, csrf 10m, limiters 5m)
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use kai_guard::config::load_or_default;
use kai_guard::http::HttpServer;
use kai_guard::lifecycle::{wait_for_signal, Shutdown};
use kai_guard::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "kai-guard", version, about = "Session, CSRF and rate-limit gateway")]
struct Args {
    /// Path to a TOML configuration file. Defaults are used when omitted.
    #[arg(short, long, env = "KAI_GUARD_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_or_default(args.config.as_deref())?;

    logging::init_tracing(&config.observability);
    tracing::info!("kai-guard v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        environment = ?config.environment,
        session_expiry_secs = config.session.expiry_secs,
        rate_limiting = config.rate_limit.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let addr: SocketAddr = config.listener.bind_address.parse()?;
    let tls_enabled = config.listener.tls.is_some();
    let server = HttpServer::new(config);

    let server_task = tokio::spawn(async move {
        if tls_enabled {
            server.run_tls(addr, server_shutdown).await
        } else {
            let listener = TcpListener::bind(addr).await?;
            tracing::info!(address = %listener.local_addr()?, "Listening for connections");
            server.run(listener, server_shutdown).await
        }
    });

    wait_for_signal().await;
    shutdown.trigger();

    server_task.await??;
    tracing::info!("Shutdown complete");
    Ok(())
}
