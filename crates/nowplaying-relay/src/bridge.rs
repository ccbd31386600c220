//! Command bridge: HTTP action requests forwarded to the producer.
//!
//! Fire-and-forget. Success means the command was queued on the producer
//! connection, not that the producer acted on it.

use crate::error::BridgeError;
use crate::hub::Hub;
use nowplaying_core::{Command, SharedSecret};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Which actions the bridge will forward.
#[derive(Debug, Clone, Default)]
pub enum ActionPolicy {
    /// Forward everything; the producer decides what it understands.
    #[default]
    Any,
    AllowList(HashSet<String>),
}

impl ActionPolicy {
    /// An empty list means no restriction.
    pub fn from_list(actions: &[String]) -> Self {
        if actions.is_empty() {
            Self::Any
        } else {
            Self::AllowList(actions.iter().cloned().collect())
        }
    }

    pub fn permits(&self, action: &str) -> bool {
        match self {
            Self::Any => true,
            Self::AllowList(allowed) => allowed.contains(action),
        }
    }
}

/// Success body for a forwarded command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForwardReceipt {
    pub message: String,
    pub status: &'static str,
}

pub struct CommandBridge {
    hub: Arc<Hub>,
    secret: SharedSecret,
    policy: ActionPolicy,
}

impl CommandBridge {
    pub fn new(hub: Arc<Hub>, secret: SharedSecret, policy: ActionPolicy) -> Self {
        Self {
            hub,
            secret,
            policy,
        }
    }

    /// Forward `{action, payload}` to the current producer.
    pub async fn forward(
        &self,
        action: &str,
        payload: Value,
        credential: Option<&str>,
    ) -> Result<ForwardReceipt, BridgeError> {
        self.dispatch(action, credential, || Ok(payload)).await
    }

    /// Like [`forward`](Self::forward), decoding the payload from a raw
    /// request body. An empty body is `{}`. The body is only decoded once
    /// the credential and producer checks pass.
    pub async fn forward_body(
        &self,
        action: &str,
        body: &[u8],
        credential: Option<&str>,
    ) -> Result<ForwardReceipt, BridgeError> {
        self.dispatch(action, credential, || decode_payload(body))
            .await
    }

    async fn dispatch(
        &self,
        action: &str,
        credential: Option<&str>,
        payload: impl FnOnce() -> Result<Value, BridgeError>,
    ) -> Result<ForwardReceipt, BridgeError> {
        if !self.secret.matches(credential) {
            tracing::warn!(action, "Rejected command with bad credential");
            return Err(BridgeError::Unauthorized);
        }
        if !self.policy.permits(action) {
            tracing::warn!(action, "Rejected command not on allow-list");
            return Err(BridgeError::ActionNotAllowed(action.to_string()));
        }
        // The producer may disconnect right after this read; the send below
        // then fails as ForwardFailed.
        let producer = self.hub.producer().await.ok_or(BridgeError::Unavailable)?;

        let command = Command::new(action, payload()?);
        let json = command
            .to_json()
            .map_err(|e| BridgeError::ForwardFailed(e.to_string()))?;
        producer.send(json.into()).map_err(|e| {
            tracing::warn!(action, "Error forwarding command to producer: {}", e);
            BridgeError::ForwardFailed(e.to_string())
        })?;

        tracing::info!(action, conn_id = producer.id(), "Command forwarded");
        Ok(ForwardReceipt {
            message: format!("Command '{action}' sent to bot"),
            status: "success",
        })
    }
}

fn decode_payload(body: &[u8]) -> Result<Value, BridgeError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(body).map_err(|e| BridgeError::ForwardFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Connection, Outbound, OutboundRx};
    use serde_json::json;

    const SECRET: &str = "bot-secret";

    fn setup(policy: ActionPolicy) -> (Arc<Hub>, CommandBridge) {
        let secret = SharedSecret::new(SECRET).unwrap();
        let hub = Arc::new(Hub::new(secret.clone()));
        let bridge = CommandBridge::new(hub.clone(), secret, policy);
        (hub, bridge)
    }

    async fn producer(hub: &Hub) -> (Connection, OutboundRx) {
        let (conn, rx) = Connection::open();
        let _ = hub.accept(&conn, Some(SECRET)).await;
        (conn, rx)
    }

    #[tokio::test]
    async fn forwards_exact_command() {
        let (hub, bridge) = setup(ActionPolicy::Any);
        let (_p, mut rx) = producer(&hub).await;

        let receipt = bridge.forward("skip", json!({}), Some(SECRET)).await.unwrap();
        assert_eq!(receipt.status, "success");
        assert_eq!(receipt.message, "Command 'skip' sent to bot");
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Text(r#"{"action":"skip","payload":{}}"#.into())
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unavailable_without_producer() {
        let (_hub, bridge) = setup(ActionPolicy::Any);
        let err = bridge.forward("skip", json!({}), Some(SECRET)).await.unwrap_err();
        assert!(matches!(err, BridgeError::Unavailable));
        assert_eq!(err.status_code(), 503);
    }

    #[tokio::test]
    async fn unauthorized_regardless_of_producer() {
        let (hub, bridge) = setup(ActionPolicy::Any);
        let err = bridge.forward("skip", json!({}), Some("wrong")).await.unwrap_err();
        assert!(matches!(err, BridgeError::Unauthorized));

        let (_p, mut rx) = producer(&hub).await;
        let err = bridge.forward("skip", json!({}), None).await.unwrap_err();
        assert!(matches!(err, BridgeError::Unauthorized));
        assert_eq!(err.status_code(), 401);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_producer_is_forward_failed() {
        let (hub, bridge) = setup(ActionPolicy::Any);
        let (_p, rx) = producer(&hub).await;
        drop(rx);

        let err = bridge.forward("skip", json!({}), Some(SECRET)).await.unwrap_err();
        assert!(matches!(err, BridgeError::ForwardFailed(_)));
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn allow_list_is_enforced() {
        let policy = ActionPolicy::from_list(&["skip".to_string()]);
        let (hub, bridge) = setup(policy);
        let (_p, mut rx) = producer(&hub).await;

        let err = bridge.forward("stop", json!({}), Some(SECRET)).await.unwrap_err();
        assert!(matches!(err, BridgeError::ActionNotAllowed(_)));
        assert!(rx.try_recv().is_err());

        let _ = bridge.forward("skip", json!({}), Some(SECRET)).await.unwrap();
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn body_decoding() {
        let (hub, bridge) = setup(ActionPolicy::Any);
        let (_p, mut rx) = producer(&hub).await;

        let _ = bridge.forward_body("loop", b"", Some(SECRET)).await.unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Text(r#"{"action":"loop","payload":{}}"#.into())
        );

        let _ = bridge
            .forward_body("play", br#"{"query":"lofi"}"#, Some(SECRET))
            .await
            .unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Text(r#"{"action":"play","payload":{"query":"lofi"}}"#.into())
        );

        let err = bridge
            .forward_body("play", b"{oops", Some(SECRET))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::ForwardFailed(_)));
    }

    #[tokio::test]
    async fn bad_body_checked_after_credential() {
        let (_hub, bridge) = setup(ActionPolicy::Any);
        let err = bridge.forward_body("play", b"{oops", None).await.unwrap_err();
        assert!(matches!(err, BridgeError::Unauthorized));
    }
}
