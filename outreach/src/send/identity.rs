//! Sender identities and round-robin rotation across them.

use std::fmt;
use std::sync::Arc;

use crate::error::ConfigError;

/// A secret string that never shows up in `Debug` output.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the underlying value. Only the transport should call this.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// A credentialed outbound mail account.
#[derive(Debug, Clone)]
pub struct SenderIdentity {
    address: String,
    credential: Secret,
}

impl SenderIdentity {
    pub fn new(address: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            credential: Secret::new(credential),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn credential(&self) -> &Secret {
        &self.credential
    }
}

/// Round-robin assignment of sender identities by enqueue position.
///
/// Rotation always starts from the first identity; there is no cursor
/// carried between runs.
#[derive(Debug, Clone)]
pub struct SenderRotation {
    identities: Arc<[Arc<SenderIdentity>]>,
}

impl SenderRotation {
    /// Build a rotation, rejecting an empty identity set up front so that
    /// `identity_for` can never fail.
    pub fn new(identities: Vec<SenderIdentity>) -> Result<Self, ConfigError> {
        if identities.is_empty() {
            return Err(ConfigError::NoSenders);
        }
        Ok(Self {
            identities: identities.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn identity_for(&self, index: usize) -> Arc<SenderIdentity> {
        Arc::clone(&self.identities[index % self.identities.len()])
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}
