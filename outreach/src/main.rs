//! Outreach Sender - sends one tracked batch of outreach email.
//!
//! Extracts contacts from the configured document, then sends a templated
//! message to each through a pool of workers with throttling and retries.
//! SIGINT/SIGTERM stop new work; sends already in flight finish.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use outreach::send::{
    DispatchSettings, Dispatcher, LinkBuilder, MessageTemplate, SenderRotation, SmtpMailer,
};
use outreach::shutdown::{listen_for_signals, Shutdown};
use outreach::{Config, DocumentSource};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("sender_starting");

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        senders = config.sender_identities.len(),
        smtp_host = %config.smtp_host,
        tracking_server_url = %config.tracking_server_url,
        contacts_path = %config.contacts_path.display(),
        concurrency = config.worker_concurrency,
        batch_size = config.batch_size,
        max_retries = config.max_retries,
        "config_loaded"
    );

    // Everything that can be misconfigured is checked before anything is queued
    let rotation = SenderRotation::new(config.sender_identities.clone())
        .context("Invalid sender configuration")?;
    let links = LinkBuilder::new(&config.tracking_server_url, &config.destination_url)
        .context("Invalid tracking configuration")?;
    let template = MessageTemplate::load(&config.email_subject, config.template_path.as_deref())
        .context("Invalid message template")?;
    let contacts = DocumentSource::new(config.contacts_path.clone())
        .load()
        .context("Failed to load contacts")?;

    let mailer = SmtpMailer::new(
        config.smtp_host.clone(),
        config.smtp_port,
        Duration::from_millis(config.smtp_timeout_ms),
    );

    let shutdown = Shutdown::new();
    tokio::spawn(listen_for_signals(shutdown.clone()));

    let dispatcher = Dispatcher::new(
        mailer,
        rotation,
        template,
        links,
        DispatchSettings::from_config(&config),
        shutdown,
    );

    let stats = dispatcher
        .run(&contacts, config.batch_size, config.worker_concurrency)
        .await;

    info!(
        sent = stats.sent,
        failed = stats.failed,
        retries = stats.retries,
        skipped = stats.skipped,
        total = stats.total,
        "sender_finished"
    );

    Ok(())
}
