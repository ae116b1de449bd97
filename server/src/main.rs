//! Taskboard Server - Main entry point.
//!
//! This binary starts the Taskboard dashboard server with:
//! - Structured JSON logging for production
//! - Graceful shutdown handling (SIGTERM/SIGINT)
//! - Background auto-update of the project snapshot
//!
//! # Configuration
//!
//! See [`taskboard_server::config`] for environment variable configuration.
//!
//! # Example
//!
//! ```bash
//! TASKBOARD_ASANA_TOKEN="1/1234:abcd" \
//! TASKBOARD_PROJECT_IDS="1209145611805182,1209145611805190" \
//! PORT=8080 \
//! cargo run --release --bin taskboard-server
//! ```

use std::process::ExitCode;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use taskboard_server::broadcast::SnapshotBroadcaster;
use taskboard_server::config::Config;
use taskboard_server::dashboard::Dashboard;
use taskboard_server::routes::{create_router, AppState};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize structured logging
    init_logging();

    // Load configuration
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            eprintln!("Error: {err}");
            eprintln!();
            eprintln!("Required environment variables:");
            eprintln!("  TASKBOARD_ASANA_TOKEN           - Asana personal access token");
            eprintln!("  TASKBOARD_PROJECT_IDS           - Format: gid1,gid2,gid3");
            eprintln!();
            eprintln!("Optional environment variables:");
            eprintln!("  TASKBOARD_ASANA_URL             - API base URL (default: Asana API 1.0)");
            eprintln!("  TASKBOARD_CACHE_TTL_SECS        - Snapshot validity (default: 300)");
            eprintln!("  TASKBOARD_POLL_INTERVAL_SECS    - Poll interval, 0 = off (default: 300)");
            eprintln!("  TASKBOARD_REQUEST_TIMEOUT_SECS  - Upstream timeout (default: none)");
            eprintln!("  TASKBOARD_COMPLETED_SINCE       - Task filter (default: now)");
            eprintln!("  PORT                            - HTTP server port (default: 8080)");
            eprintln!("  RUST_LOG                        - Log level filter (default: info)");
            return ExitCode::from(1);
        }
    };

    match run(config).await {
        Ok(()) => {
            info!("Server shutdown complete");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "Server error");
            ExitCode::from(1)
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!(
        port = config.port,
        projects = config.project_ids.len(),
        cache_ttl_secs = config.cache_ttl.as_secs(),
        "Taskboard server starting"
    );

    let dashboard = Dashboard::from_config(&config).context("failed to build dashboard")?;
    let broadcaster = SnapshotBroadcaster::new();

    // Spawn auto-update poller
    let poller = config.poll_interval.map(|interval| {
        let sink = broadcaster.clone();
        dashboard.start_auto_update(
            move |snapshot| {
                sink.broadcast(snapshot);
            },
            interval,
        )
    });
    if poller.is_none() {
        info!("Auto-update disabled");
    }

    let app = create_router(AppState::with_components(dashboard, broadcaster));

    // Bind to address
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind to {bind_addr}"))?;
    info!(port = config.port, address = %bind_addr, "Server listening");

    // Start server with graceful shutdown
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server terminated unexpectedly");

    info!("Server shutting down gracefully");

    if let Some(poller) = poller {
        poller.shutdown().await;
        info!("Auto-update poller stopped");
    }

    served
}

/// Initialize structured logging with tracing.
///
/// Configures JSON-formatted output with:
/// - Environment-based log level filtering via RUST_LOG
/// - Default log level of `info`
/// - Target and level information
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,axum::rejection=trace"));

    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .init();
}

/// Creates a future that resolves when a shutdown signal is received.
///
/// Listens for:
/// - SIGTERM (container orchestrator shutdown)
/// - SIGINT (Ctrl+C)
///
/// If a handler cannot be installed, that signal is ignored and the other
/// one still triggers shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
