//! Shared-secret credential.
//!
//! The producer proves itself by presenting the process-wide secret in a
//! connection-scoped header. Comparison is exact string equality.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The process-wide shared secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SharedSecret(String);

impl SharedSecret {
    /// Create a secret, rejecting the empty string.
    pub fn new(secret: impl Into<String>) -> Result<Self, SecretError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(SecretError::Empty);
        }
        Ok(Self(secret))
    }

    /// Check a presented credential. A missing credential never matches.
    pub fn matches(&self, presented: Option<&str>) -> bool {
        presented == Some(self.0.as_str())
    }

    /// The raw secret, for attaching to outgoing requests.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

// Never print the secret itself.
impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(***)")
    }
}

impl FromStr for SharedSecret {
    type Err = SecretError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SharedSecret {
    type Error = SecretError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<SharedSecret> for String {
    fn from(secret: SharedSecret) -> Self {
        secret.0
    }
}

/// Error constructing a shared secret.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SecretError {
    #[error("shared secret cannot be empty")]
    Empty,
}
