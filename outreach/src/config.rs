//! Configuration module for environment variable parsing.
//!
//! Both binaries read all of their settings from the environment. Anything
//! unset falls back to a default suitable for a local run.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::send::identity::SenderIdentity;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Sender Configuration
    // =========================================================================
    /// Credentialed accounts used to send, in rotation order
    pub sender_identities: Vec<SenderIdentity>,

    /// SMTP relay host
    pub smtp_host: String,

    /// Optional SMTP port override (relay default otherwise)
    pub smtp_port: Option<u16>,

    /// Upper bound on a single SMTP send in milliseconds
    pub smtp_timeout_ms: u64,

    /// Base URL of the tracking server embedded in outbound mail
    pub tracking_server_url: String,

    /// Destination behind the tracked click link
    pub destination_url: String,

    /// Document the contacts are extracted from
    pub contacts_path: PathBuf,

    /// Subject line of every outbound message
    pub email_subject: String,

    /// Optional HTML body template file
    pub template_path: Option<PathBuf>,

    /// Number of concurrent send workers
    pub worker_concurrency: usize,

    /// Maximum contacts enqueued in one run
    pub batch_size: usize,

    /// Throttle range in seconds between sends of one worker (min, max)
    pub send_delay_secs: (u64, u64),

    /// Attempts per contact before it is counted as failed
    pub max_retries: u32,

    /// Linear backoff base in seconds between attempts
    pub retry_backoff_secs: u64,

    /// How long a worker waits on an empty queue before exiting
    pub queue_pull_timeout_ms: u64,

    // =========================================================================
    // Tracking Server Configuration
    // =========================================================================
    /// Port for the tracking server to listen on
    pub port: u16,

    /// Append-only CSV event store
    pub tracking_file: PathBuf,

    /// Redirect target when a click carries no url parameter
    pub default_redirect_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            sender_identities: parse_sender_identities(),

            smtp_host: env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string()),

            smtp_port: env::var("SMTP_PORT").ok().and_then(|v| v.parse().ok()),

            smtp_timeout_ms: env::var("SMTP_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30_000),

            tracking_server_url: env::var("TRACKING_SERVER_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:5000".to_string()),

            destination_url: env::var("DESTINATION_URL")
                .unwrap_or_else(|_| "https://www.google.com".to_string()),

            contacts_path: env::var("CONTACTS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("contacts.pdf")),

            email_subject: env::var("EMAIL_SUBJECT")
                .unwrap_or_else(|_| crate::send::template::DEFAULT_SUBJECT.to_string()),

            template_path: env::var("TEMPLATE_PATH").ok().map(PathBuf::from),

            worker_concurrency: env::var("WORKER_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),

            batch_size: env::var("BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),

            send_delay_secs: parse_range("SEND_DELAY_RANGE_SECS", (5, 15)),

            max_retries: env::var("MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),

            retry_backoff_secs: env::var("RETRY_BACKOFF_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),

            queue_pull_timeout_ms: env::var("QUEUE_PULL_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5_000),

            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5000),

            tracking_file: env::var("TRACKING_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("tracking.csv")),

            default_redirect_url: env::var("DEFAULT_REDIRECT_URL")
                .unwrap_or_else(|_| "https://www.google.com".to_string()),
        }
    }

    /// Throttle bounds as durations.
    pub fn send_delay(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.send_delay_secs.0),
            Duration::from_secs(self.send_delay_secs.1),
        )
    }
}

/// Collect sender identities from `EMAIL_USER`/`EMAIL_PASS` followed by any
/// `address:password` pairs in `SENDER_ACCOUNTS`.
fn parse_sender_identities() -> Vec<SenderIdentity> {
    let mut identities = Vec::new();

    if let (Ok(user), Ok(pass)) = (env::var("EMAIL_USER"), env::var("EMAIL_PASS")) {
        if !user.trim().is_empty() && !pass.is_empty() {
            identities.push(SenderIdentity::new(user.trim(), pass));
        }
    }

    for entry in parse_csv("SENDER_ACCOUNTS").unwrap_or_default() {
        match parse_account(&entry) {
            Some(identity) => identities.push(identity),
            None => warn!(env_var = "SENDER_ACCOUNTS", "Invalid account entry, skipping"),
        }
    }

    identities
}

/// Parse one `address:password` entry.
fn parse_account(entry: &str) -> Option<SenderIdentity> {
    let (address, credential) = entry.split_once(':')?;
    let address = address.trim();
    if address.is_empty() || credential.is_empty() {
        return None;
    }
    Some(SenderIdentity::new(address, credential))
}

/// Parse a comma-separated range like "5,15" into a tuple.
fn parse_range(name: &str, default: (u64, u64)) -> (u64, u64) {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() != 2 {
        warn!(env_var = name, value = %raw, "Invalid range format, using default");
        return default;
    }

    let min = parts[0].trim().parse::<u64>();
    let max = parts[1].trim().parse::<u64>();

    match (min, max) {
        (Ok(min), Ok(max)) if min <= max => (min, max),
        _ => {
            warn!(env_var = name, value = %raw, "Invalid range values, using default");
            default
        }
    }
}

/// Parse a comma-separated list of strings.
fn parse_csv(name: &str) -> Option<Vec<String>> {
    env::var(name).ok().map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}
