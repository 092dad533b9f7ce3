//! Tracking token generation.

use std::fmt;

use uuid::Uuid;

/// Opaque identifier correlating one sent message with later open/click
/// events.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackingToken(String);

impl TrackingToken {
    /// Mint a fresh random (v4) token. Each call draws independently, so
    /// workers can mint concurrently without coordination.
    pub fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
