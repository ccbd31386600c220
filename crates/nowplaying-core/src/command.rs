//! Commands forwarded to the producer by the command bridge.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An action request for the producer.
///
/// Carries no identifier and expects no reply: it is built per request, sent
/// once, and dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Action name. The producer decides which actions it recognizes.
    pub action: String,
    /// Opaque action arguments.
    pub payload: Value,
}

impl Command {
    pub fn new(action: impl Into<String>, payload: Value) -> Self {
        Self {
            action: action.into(),
            payload,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
