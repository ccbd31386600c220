//! Relay hub.
//!
//! Classifies connections, owns the registry and the state cache, and fans
//! producer state out to subscribers. All registry and cache mutation goes
//! through the hub's lock; outside readers only ever get cloned handles.

use crate::cache::StateCache;
use crate::connection::Connection;
use crate::error::RelayError;
use crate::registry::Registry;
use nowplaying_core::{ProducerFrame, Role, SharedSecret, SubscriberRequest, heartbeat_ack};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

struct HubState {
    registry: Registry,
    cache: StateCache,
}

/// What the hub did with a producer frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerOutcome {
    HeartbeatAcked,
    Broadcast(BroadcastReport),
    /// The sender has been displaced by a newer producer.
    Stale,
}

/// What the hub did with a subscriber frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberOutcome {
    ForwardedToProducer,
    Ignored,
}

/// Per-broadcast delivery counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Summary served on `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct HubStatus {
    pub producer_connected: bool,
    pub subscribers: usize,
    pub has_snapshot: bool,
}

pub struct Hub {
    secret: SharedSecret,
    state: RwLock<HubState>,
}

impl Hub {
    pub fn new(secret: SharedSecret) -> Self {
        Self {
            secret,
            state: RwLock::new(HubState {
                registry: Registry::new(),
                cache: StateCache::new(),
            }),
        }
    }

    /// Classify and register a freshly opened connection.
    ///
    /// A producer replaces whoever held the slot; the displaced connection is
    /// closed. A subscriber is sent the cached snapshot before this returns.
    pub async fn accept(&self, conn: &Connection, credential: Option<&str>) -> Role {
        if self.secret.matches(credential) {
            let role = conn.activate(Role::Producer);
            let displaced = {
                let mut s = self.state.write().await;
                s.registry.install_producer(conn.clone())
            };
            if let Some(old) = displaced {
                tracing::info!(
                    conn_id = conn.id(),
                    displaced = old.id(),
                    "Producer replaced; closing previous connection"
                );
                old.close();
            } else {
                tracing::info!(conn_id = conn.id(), "Producer connected");
            }
            role
        } else {
            let role = conn.activate(Role::Subscriber);
            let mut s = self.state.write().await;
            let _ = s.registry.insert_subscriber(conn.clone());
            // Pushed under the lock so no broadcast can slip in ahead of it.
            if let Some(snapshot) = s.cache.get() {
                if let Err(e) = conn.send(snapshot) {
                    tracing::warn!(conn_id = conn.id(), "Failed to send snapshot: {}", e);
                }
            }
            tracing::info!(
                conn_id = conn.id(),
                subscribers = s.registry.subscriber_count(),
                "Subscriber connected"
            );
            role
        }
    }

    /// Handle one text frame from a producer connection.
    pub async fn on_producer_text(
        &self,
        conn: &Connection,
        text: &str,
    ) -> Result<ProducerOutcome, RelayError> {
        match ProducerFrame::classify(text)? {
            ProducerFrame::Heartbeat => {
                conn.send(heartbeat_ack().into())?;
                tracing::trace!(conn_id = conn.id(), "Heartbeat acknowledged");
                Ok(ProducerOutcome::HeartbeatAcked)
            }
            ProducerFrame::State => {
                let payload: Arc<str> = Arc::from(text);
                let recipients = {
                    let mut s = self.state.write().await;
                    if !s.registry.is_producer(conn.id()) {
                        tracing::debug!(conn_id = conn.id(), "Dropping state from stale producer");
                        return Ok(ProducerOutcome::Stale);
                    }
                    s.cache.store(payload.clone());
                    s.registry.subscriber_snapshot()
                };
                let report = broadcast(&recipients, &payload);
                tracing::debug!(
                    delivered = report.delivered,
                    failed = report.failed,
                    bytes = payload.len(),
                    "Broadcast producer state"
                );
                Ok(ProducerOutcome::Broadcast(report))
            }
        }
    }

    /// Handle one text frame from a subscriber connection.
    pub async fn on_subscriber_text(&self, text: &str) -> Result<SubscriberOutcome, RelayError> {
        let request = SubscriberRequest::parse(text)?;
        if !request.is_status_request() {
            tracing::debug!(action = %request.action, "Ignoring subscriber action");
            return Ok(SubscriberOutcome::Ignored);
        }
        let Some(producer) = self.producer().await else {
            return Ok(SubscriberOutcome::Ignored);
        };
        producer.send(SubscriberRequest::status_request().to_json()?.into())?;
        Ok(SubscriberOutcome::ForwardedToProducer)
    }

    /// Deregister a connection whose receive loop has ended.
    pub async fn release(&self, conn: &Connection) {
        conn.close();
        let mut s = self.state.write().await;
        match conn.role() {
            Some(Role::Producer) => {
                if s.registry.clear_producer_if(conn.id()) {
                    tracing::info!(conn_id = conn.id(), "Producer disconnected");
                } else {
                    tracing::debug!(conn_id = conn.id(), "Displaced producer disconnected");
                }
            }
            Some(Role::Subscriber) => {
                let _ = s.registry.remove_subscriber(conn.id());
                tracing::info!(
                    conn_id = conn.id(),
                    subscribers = s.registry.subscriber_count(),
                    "Subscriber disconnected"
                );
            }
            None => {}
        }
    }

    /// Handle on the current producer, if any.
    pub async fn producer(&self) -> Option<Connection> {
        self.state.read().await.registry.producer().cloned()
    }

    pub async fn status(&self) -> HubStatus {
        let s = self.state.read().await;
        HubStatus {
            producer_connected: s.registry.producer().is_some(),
            subscribers: s.registry.subscriber_count(),
            has_snapshot: !s.cache.is_empty(),
        }
    }
}

/// Send `payload` to every recipient. One failure never stops the rest.
fn broadcast(recipients: &[Connection], payload: &Arc<str>) -> BroadcastReport {
    let mut report = BroadcastReport::default();
    for conn in recipients {
        match conn.send(payload.clone()) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                report.failed += 1;
                tracing::warn!(conn_id = conn.id(), "Failed to send to subscriber: {}", e);
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Outbound, OutboundRx};

    const SECRET: &str = "bot-secret";

    fn hub() -> Hub {
        Hub::new(SharedSecret::new(SECRET).unwrap())
    }

    async fn subscriber(hub: &Hub) -> (Connection, OutboundRx) {
        let (conn, rx) = Connection::open();
        assert_eq!(hub.accept(&conn, None).await, Role::Subscriber);
        (conn, rx)
    }

    async fn producer(hub: &Hub) -> (Connection, OutboundRx) {
        let (conn, rx) = Connection::open();
        assert_eq!(hub.accept(&conn, Some(SECRET)).await, Role::Producer);
        (conn, rx)
    }

    fn drain(rx: &mut OutboundRx) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn text(s: &str) -> Outbound {
        Outbound::Text(s.into())
    }

    #[tokio::test]
    async fn wrong_or_missing_credential_is_subscriber() {
        let hub = hub();
        let (conn, _rx) = Connection::open();
        assert_eq!(hub.accept(&conn, Some("nope")).await, Role::Subscriber);
        assert_eq!(conn.role(), Some(Role::Subscriber));
        assert!(hub.producer().await.is_none());
    }

    #[tokio::test]
    async fn state_reaches_every_subscriber_verbatim() {
        let hub = hub();
        let mut subs = Vec::new();
        for _ in 0..5 {
            subs.push(subscriber(&hub).await);
        }
        let (p, _prx) = producer(&hub).await;

        let payload = r#"{ "type": "now_playing",  "title": "Intro" }"#;
        let outcome = hub.on_producer_text(&p, payload).await.unwrap();
        assert_eq!(
            outcome,
            ProducerOutcome::Broadcast(BroadcastReport {
                delivered: 5,
                failed: 0
            })
        );
        for (_, rx) in &mut subs {
            assert_eq!(drain(rx), vec![text(payload)]);
        }
    }

    #[tokio::test]
    async fn late_subscriber_gets_snapshot() {
        let hub = hub();
        let (p, _prx) = producer(&hub).await;
        let _ = hub.on_producer_text(&p, r#"{"title":"a"}"#).await.unwrap();
        let _ = hub.on_producer_text(&p, r#"{"title":"b"}"#).await.unwrap();

        let (_s, mut rx) = subscriber(&hub).await;
        assert_eq!(drain(&mut rx), vec![text(r#"{"title":"b"}"#)]);
    }

    #[tokio::test]
    async fn early_subscriber_waits_for_first_state() {
        let hub = hub();
        let (_s, mut rx) = subscriber(&hub).await;
        assert!(drain(&mut rx).is_empty());

        let (p, _prx) = producer(&hub).await;
        assert!(drain(&mut rx).is_empty());

        let _ = hub.on_producer_text(&p, r#"{"title":"a"}"#).await.unwrap();
        assert_eq!(drain(&mut rx), vec![text(r#"{"title":"a"}"#)]);
    }

    #[tokio::test]
    async fn heartbeat_is_acked_not_relayed() {
        let hub = hub();
        let (_s, mut srx) = subscriber(&hub).await;
        let (p, mut prx) = producer(&hub).await;

        let outcome = hub
            .on_producer_text(&p, r#"{"type":"heartbeat"}"#)
            .await
            .unwrap();
        assert_eq!(outcome, ProducerOutcome::HeartbeatAcked);
        assert_eq!(drain(&mut prx), vec![text(r#"{"type":"heartbeat_ack"}"#)]);
        assert!(drain(&mut srx).is_empty());
        assert!(!hub.status().await.has_snapshot);
    }

    #[tokio::test]
    async fn malformed_producer_frame_is_an_error_and_changes_nothing() {
        let hub = hub();
        let (_s, mut srx) = subscriber(&hub).await;
        let (p, _prx) = producer(&hub).await;

        let err = hub.on_producer_text(&p, "{not json").await.unwrap_err();
        assert!(matches!(err, RelayError::MalformedMessage(_)));
        assert!(drain(&mut srx).is_empty());
        assert!(!hub.status().await.has_snapshot);

        // The session carries on.
        let _ = hub.on_producer_text(&p, r#"{"ok":true}"#).await.unwrap();
        assert_eq!(drain(&mut srx), vec![text(r#"{"ok":true}"#)]);
    }

    #[tokio::test]
    async fn dead_subscriber_does_not_abort_broadcast() {
        let hub = hub();
        let (_a, mut arx) = subscriber(&hub).await;
        let (_b, brx) = subscriber(&hub).await;
        let (_c, mut crx) = subscriber(&hub).await;
        drop(brx);
        let (p, _prx) = producer(&hub).await;

        let outcome = hub.on_producer_text(&p, r#"{"n":1}"#).await.unwrap();
        assert_eq!(
            outcome,
            ProducerOutcome::Broadcast(BroadcastReport {
                delivered: 2,
                failed: 1
            })
        );
        assert_eq!(drain(&mut arx), vec![text(r#"{"n":1}"#)]);
        assert_eq!(drain(&mut crx), vec![text(r#"{"n":1}"#)]);
        // Failed sends do not evict.
        assert_eq!(hub.status().await.subscribers, 3);
    }

    #[tokio::test]
    async fn new_producer_displaces_old() {
        let hub = hub();
        let (_s, mut srx) = subscriber(&hub).await;
        let (old, mut old_rx) = producer(&hub).await;
        let (new, _new_rx) = producer(&hub).await;

        // The displaced connection is closed explicitly.
        assert_eq!(drain(&mut old_rx), vec![Outbound::Close]);

        assert_eq!(
            hub.on_producer_text(&old, r#"{"from":"old"}"#).await.unwrap(),
            ProducerOutcome::Stale
        );
        let _ = hub
            .on_producer_text(&new, r#"{"from":"new"}"#)
            .await
            .unwrap();
        assert_eq!(drain(&mut srx), vec![text(r#"{"from":"new"}"#)]);

        // The old producer going away leaves the new one in place.
        hub.release(&old).await;
        assert_eq!(hub.producer().await.map(|p| p.id()), Some(new.id()));

        hub.release(&new).await;
        assert!(hub.producer().await.is_none());
    }

    #[tokio::test]
    async fn snapshot_survives_producer_disconnect() {
        let hub = hub();
        let (p, _prx) = producer(&hub).await;
        let _ = hub.on_producer_text(&p, r#"{"title":"x"}"#).await.unwrap();
        hub.release(&p).await;

        let (_s, mut rx) = subscriber(&hub).await;
        assert_eq!(drain(&mut rx), vec![text(r#"{"title":"x"}"#)]);
    }

    #[tokio::test]
    async fn status_request_is_forwarded_when_producer_present() {
        let hub = hub();
        assert_eq!(
            hub.on_subscriber_text(r#"{"action":"status_request"}"#)
                .await
                .unwrap(),
            SubscriberOutcome::Ignored
        );

        let (_p, mut prx) = producer(&hub).await;
        assert_eq!(
            hub.on_subscriber_text(r#"{"action":"status_request","x":1}"#)
                .await
                .unwrap(),
            SubscriberOutcome::ForwardedToProducer
        );
        assert_eq!(drain(&mut prx), vec![text(r#"{"action":"status_request"}"#)]);

        assert_eq!(
            hub.on_subscriber_text(r#"{"action":"skip"}"#).await.unwrap(),
            SubscriberOutcome::Ignored
        );
        assert!(drain(&mut prx).is_empty());
        assert!(hub.on_subscriber_text("hello").await.is_err());
    }

    #[tokio::test]
    async fn release_subscriber_is_idempotent() {
        let hub = hub();
        let (s, _rx) = subscriber(&hub).await;
        hub.release(&s).await;
        hub.release(&s).await;
        assert_eq!(hub.status().await.subscribers, 0);
    }
}
