//! Tracking URL construction for outbound mail.

use url::Url;

use crate::error::ConfigError;
use crate::send::token::TrackingToken;

/// The two tracked URLs embedded in one message. Both carry the same token
/// and recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingLinks {
    pub pixel_url: String,
    pub click_url: String,
}

/// Builds tracked URLs against a fixed tracking server and destination.
#[derive(Debug, Clone)]
pub struct LinkBuilder {
    pixel_base: Url,
    redirect_base: Url,
    destination: String,
}

impl LinkBuilder {
    /// Validate the tracking server base once at startup.
    pub fn new(tracking_server: &str, destination: &str) -> Result<Self, ConfigError> {
        let base = Url::parse(tracking_server).map_err(|e| ConfigError::InvalidTrackingUrl {
            url: tracking_server.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            pixel_base: endpoint(&base, "pixel", tracking_server)?,
            redirect_base: endpoint(&base, "redirect", tracking_server)?,
            destination: destination.to_string(),
        })
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Build the pixel and click URLs for one recipient.
    pub fn links(&self, token: &TrackingToken, recipient: &str) -> TrackingLinks {
        let mut pixel = self.pixel_base.clone();
        pixel
            .query_pairs_mut()
            .append_pair("id", token.as_str())
            .append_pair("email", recipient);

        let mut click = self.redirect_base.clone();
        click
            .query_pairs_mut()
            .append_pair("id", token.as_str())
            .append_pair("email", recipient)
            .append_pair("url", &self.destination);

        TrackingLinks {
            pixel_url: pixel.into(),
            click_url: click.into(),
        }
    }
}

/// Append one path segment to the base, keeping any path prefix it has.
fn endpoint(base: &Url, segment: &str, raw: &str) -> Result<Url, ConfigError> {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| ConfigError::InvalidTrackingUrl {
            url: raw.to_string(),
            reason: "url cannot be used as a base".to_string(),
        })?
        .pop_if_empty()
        .push(segment);
    Ok(url)
}
