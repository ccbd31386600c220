//! Relay channel envelopes.
//!
//! Producer frames are classified by their `type` field. Anything that is not
//! a heartbeat is state and is relayed verbatim, so this module never
//! re-encodes producer payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const HEARTBEAT: &str = "heartbeat";
const STATUS_REQUEST: &str = "status_request";

/// Classification of an inbound producer frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerFrame {
    /// Liveness probe; answered with [`heartbeat_ack`] and never cached.
    Heartbeat,
    /// Opaque state to cache and broadcast.
    State,
}

impl ProducerFrame {
    /// Classify a text frame. The frame must be a JSON object.
    pub fn classify(text: &str) -> Result<Self, EnvelopeError> {
        let value: Value = serde_json::from_str(text)?;
        let object = value.as_object().ok_or(EnvelopeError::NotAnObject)?;
        match object.get("type").and_then(Value::as_str) {
            Some(HEARTBEAT) => Ok(Self::Heartbeat),
            _ => Ok(Self::State),
        }
    }
}

/// Messages the relay itself originates on the producer channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RelayNotice {
    HeartbeatAck,
}

/// The `{"type":"heartbeat_ack"}` reply.
pub fn heartbeat_ack() -> String {
    // Serializing a unit variant cannot fail.
    serde_json::to_string(&RelayNotice::HeartbeatAck).unwrap_or_default()
}

/// A command envelope sent by a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberRequest {
    pub action: String,
}

impl SubscriberRequest {
    /// Decode `{"action": "..."}`; extra fields are ignored.
    pub fn parse(text: &str) -> Result<Self, EnvelopeError> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(EnvelopeError::NotAnObject);
        }
        Ok(serde_json::from_value(value)?)
    }

    /// The only action subscribers may send.
    pub fn status_request() -> Self {
        Self {
            action: STATUS_REQUEST.to_string(),
        }
    }

    pub fn is_status_request(&self) -> bool {
        self.action == STATUS_REQUEST
    }

    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// An inbound frame that does not decode as the expected envelope.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("envelope must be a JSON object")]
    NotAnObject,
}
