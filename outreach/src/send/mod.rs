//! Send pipeline.
//!
//! ```text
//! Contacts → ContactQueue → workers (token, sender, links, template) → Mailer → RunStatistics
//! ```

pub mod dispatcher;
pub mod identity;
pub mod links;
pub mod mailer;
pub mod queue;
pub mod stats;
pub mod template;
pub mod token;

pub use dispatcher::{DispatchSettings, Dispatcher};
pub use identity::{SenderIdentity, SenderRotation};
pub use links::{LinkBuilder, TrackingLinks};
pub use mailer::{Mailer, SmtpMailer};
pub use queue::{ContactQueue, SendTask};
pub use stats::{DeliveryOutcome, RunStatistics};
pub use template::{MessageTemplate, OutgoingMessage};
pub use token::TrackingToken;
