//! Outreach Tracker - open/click tracking web server.
//!
//! This binary serves the tracking pixel and click redirect embedded in
//! outreach mail, appends every hit to the CSV event store, and renders the
//! recorded events on a dashboard.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use outreach::shutdown::{listen_for_signals, Shutdown};
use outreach::web::{router, AppState};
use outreach::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("tracker_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        tracking_file = %config.tracking_file.display(),
        default_redirect_url = %config.default_redirect_url,
        "config_loaded"
    );

    let state = AppState::from_config(&config);
    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "tracker_listening");

    let shutdown = Shutdown::new();
    tokio::spawn(listen_for_signals(shutdown.clone()));

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.triggered().await;
            info!("tracker_shutting_down");
        })
        .await
        .context("Server error")?;

    info!("tracker_shutdown_complete");

    Ok(())
}
