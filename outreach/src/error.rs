//! Error types shared by the send pipeline and the tracking store.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal, pre-run configuration problems. Nothing is enqueued once one of
/// these is returned.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no sender identities configured (set EMAIL_USER and EMAIL_PASS or SENDER_ACCOUNTS)")]
    NoSenders,

    #[error("contact source document not found: {}", .0.display())]
    MissingSource(PathBuf),

    #[error("failed to read contact source {}: {reason}", .path.display())]
    UnreadableSource { path: PathBuf, reason: String },

    #[error("no valid email entries found in {}", .0.display())]
    NoContacts(PathBuf),

    #[error("invalid tracking server url {url:?}: {reason}")]
    InvalidTrackingUrl { url: String, reason: String },

    #[error("failed to load message template {}: {source}", .path.display())]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A single failed delivery attempt. Always retried up to the configured
/// limit and never returned from a dispatch run.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("invalid address {address:?}: {reason}")]
    Address { address: String, reason: String },

    #[error("failed to build message: {0}")]
    Message(String),

    #[error("smtp transport error: {0}")]
    Transport(String),

    #[error("send timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Failure to append to or read the event store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("event store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("event store csv error: {0}")]
    Csv(#[from] csv::Error),
}
