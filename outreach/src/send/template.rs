//! Outbound message rendering.
//!
//! Templates use `{placeholder}` markers. Unknown placeholders are left as
//! written so a typo shows up in the delivered mail rather than vanishing.

use std::path::Path;

use crate::contacts::Contact;
use crate::error::ConfigError;
use crate::send::identity::SenderIdentity;
use crate::send::links::TrackingLinks;
use crate::util::escape_html;

pub const DEFAULT_SUBJECT: &str = "Exploring opportunities with your team";

const DEFAULT_BODY: &str = r#"<html><body>
Dear {name},<br>
I hope this message finds you well.<br>
I am reaching out with genuine interest in any opportunities within your organization
and would welcome the chance to learn more about your team.<br>
My resume is available here: <a href="{tracked_link}">Click here to view my resume</a><br>
Thank you for your time. Looking forward to hearing from you!<br>
Warm regards,<br>
{sender_email}
<img src="{open_pixel_url}" alt="" width="1" height="1" style="display:none;">
</body></html>"#;

/// A rendered message ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub recipient: String,
    pub subject: String,
    pub html_body: String,
}

/// Subject and HTML body template shared by every send in a run.
#[derive(Debug, Clone)]
pub struct MessageTemplate {
    subject: String,
    body: String,
}

impl MessageTemplate {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// The built-in body with the given subject.
    pub fn with_default_body(subject: impl Into<String>) -> Self {
        Self::new(subject, DEFAULT_BODY)
    }

    /// Load the body from a file, or fall back to the built-in body.
    pub fn load(subject: &str, path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let body = std::fs::read_to_string(path).map_err(|source| ConfigError::Template {
                    path: path.to_path_buf(),
                    source,
                })?;
                Ok(Self::new(subject, body))
            }
            None => Ok(Self::with_default_body(subject)),
        }
    }

    /// Render the message for one recipient.
    pub fn render(
        &self,
        sender: &SenderIdentity,
        recipient: &Contact,
        links: &TrackingLinks,
        destination_url: &str,
    ) -> OutgoingMessage {
        let name = if recipient.display_name.trim().is_empty() {
            "there"
        } else {
            recipient.display_name.as_str()
        };

        let html_body = substitute(&self.body, |key| match key {
            "name" => Some(name),
            "recipient_email" => Some(recipient.email.as_str()),
            "sender_email" => Some(sender.address()),
            "open_pixel_url" => Some(links.pixel_url.as_str()),
            "tracked_link" => Some(links.click_url.as_str()),
            "destination_url" => Some(destination_url),
            _ => None,
        });

        OutgoingMessage {
            recipient: recipient.email.clone(),
            subject: self.subject.clone(),
            html_body,
        }
    }
}

/// Single pass over the template so substituted values are never themselves
/// scanned for placeholders.
fn substitute<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(template.len() + 256);
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => match lookup(&after[..end]) {
                Some(value) => {
                    out.push_str(&escape_html(value));
                    rest = &after[end + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            },
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
