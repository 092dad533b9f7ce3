//! Outbound mail transport.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::debug;

use crate::error::SendError;
use crate::send::identity::SenderIdentity;
use crate::send::template::OutgoingMessage;

/// Sends one rendered message on behalf of a sender identity.
///
/// A returned error is treated as transient by the dispatcher and retried.
pub trait Mailer: Send + Sync + 'static {
    fn send(
        &self,
        sender: &SenderIdentity,
        message: &OutgoingMessage,
    ) -> impl Future<Output = Result<(), SendError>> + Send;
}

type SmtpTransport = AsyncSmtpTransport<Tokio1Executor>;

/// SMTP mailer backed by `lettre`, with one relay transport per sender
/// identity.
pub struct SmtpMailer {
    host: String,
    port: Option<u16>,
    timeout: Duration,
    transports: Mutex<HashMap<String, SmtpTransport>>,
}

impl SmtpMailer {
    pub fn new(host: impl Into<String>, port: Option<u16>, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
            transports: Mutex::new(HashMap::new()),
        }
    }

    /// Get the cached transport for this identity, building it on first use.
    fn transport_for(&self, sender: &SenderIdentity) -> Result<SmtpTransport, SendError> {
        let mut transports = self
            .transports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(transport) = transports.get(sender.address()) {
            return Ok(transport.clone());
        }

        let mut builder = SmtpTransport::relay(&self.host)
            .map_err(|e| SendError::Transport(e.to_string()))?
            .credentials(Credentials::new(
                sender.address().to_string(),
                sender.credential().expose().to_string(),
            ))
            .timeout(Some(self.timeout));
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        let transport = builder.build();

        debug!(sender = %sender.address(), host = %self.host, "smtp_transport_created");
        transports.insert(sender.address().to_string(), transport.clone());
        Ok(transport)
    }
}

/// Build the MIME message: HTML body, replies routed back to the sender.
pub fn build_message(sender: &SenderIdentity, message: &OutgoingMessage) -> Result<Message, SendError> {
    let from: Mailbox = parse_mailbox(sender.address())?;
    let to: Mailbox = parse_mailbox(&message.recipient)?;

    Message::builder()
        .from(from.clone())
        .reply_to(from)
        .to(to)
        .subject(message.subject.as_str())
        .header(ContentType::TEXT_HTML)
        .body(message.html_body.clone())
        .map_err(|e| SendError::Message(e.to_string()))
}

fn parse_mailbox(address: &str) -> Result<Mailbox, SendError> {
    address.parse().map_err(|e: lettre::address::AddressError| SendError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

impl Mailer for SmtpMailer {
    fn send(
        &self,
        sender: &SenderIdentity,
        message: &OutgoingMessage,
    ) -> impl Future<Output = Result<(), SendError>> + Send {
        let prepared = build_message(sender, message).and_then(|email| {
            let transport = self.transport_for(sender)?;
            Ok((transport, email))
        });
        let timeout = self.timeout;

        async move {
            let (transport, email) = prepared?;
            match tokio::time::timeout(timeout, transport.send(email)).await {
                Ok(Ok(_response)) => Ok(()),
                Ok(Err(e)) => Err(SendError::Transport(e.to_string())),
                Err(_) => Err(SendError::Timeout(timeout)),
            }
        }
    }
}

/// Shared mailers are mailers too, so tests can keep a handle on one.
impl<M: Mailer> Mailer for Arc<M> {
    fn send(
        &self,
        sender: &SenderIdentity,
        message: &OutgoingMessage,
    ) -> impl Future<Output = Result<(), SendError>> + Send {
        (**self).send(sender, message)
    }
}
