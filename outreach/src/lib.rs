//! Outreach - email outreach sender with open/click tracking.
//!
//! This library provides shared modules for the two binaries:
//! - `outreach-sender`: Extracts contacts and sends a tracked batch
//! - `outreach-tracker`: Web server recording opens and clicks
//!
//! ## Architecture
//!
//! ```text
//! PDF → Contacts → Dispatcher → SMTP ──(mail)──► recipient
//!                                               │
//! Dashboard ◄── tracking.csv ◄── Tracker ◄──────┘ pixel / redirect
//! ```
//!
//! The tracking token minted per message by the dispatcher is the key that
//! joins a send to its later open and click events.

pub mod config;
pub mod contacts;
pub mod error;
pub mod send;
pub mod shutdown;
pub mod tracking;
pub mod util;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use contacts::{extract_contacts, Contact, Contacts, DocumentSource};
pub use error::{ConfigError, SendError, StoreError};
pub use send::{Dispatcher, RunStatistics};
pub use shutdown::{listen_for_signals, Shutdown};
pub use tracking::{EventKind, EventStore, TrackingEvent};
pub use web::AppState;
