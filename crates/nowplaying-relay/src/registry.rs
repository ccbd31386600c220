//! Connection registry: the producer slot and the subscriber set.

use crate::connection::{Connection, ConnectionId};
use std::collections::HashMap;

/// Tracks at most one producer and any number of subscribers.
///
/// A connection is never in both places and never in either place twice.
#[derive(Debug, Default)]
pub struct Registry {
    producer: Option<Connection>,
    subscribers: HashMap<ConnectionId, Connection>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a producer, returning the one it displaced (if any, and if
    /// distinct from the new one).
    pub fn install_producer(&mut self, conn: Connection) -> Option<Connection> {
        let _ = self.subscribers.remove(&conn.id());
        let id = conn.id();
        self.producer
            .replace(conn)
            .filter(|previous| previous.id() != id)
    }

    pub fn producer(&self) -> Option<&Connection> {
        self.producer.as_ref()
    }

    pub fn is_producer(&self, id: ConnectionId) -> bool {
        self.producer.as_ref().is_some_and(|p| p.id() == id)
    }

    /// Empty the producer slot, but only if `id` still holds it.
    pub fn clear_producer_if(&mut self, id: ConnectionId) -> bool {
        if self.is_producer(id) {
            self.producer = None;
            true
        } else {
            false
        }
    }

    /// Add a subscriber. Returns false if the connection is already
    /// registered in either role.
    pub fn insert_subscriber(&mut self, conn: Connection) -> bool {
        if self.is_producer(conn.id()) || self.subscribers.contains_key(&conn.id()) {
            return false;
        }
        let _ = self.subscribers.insert(conn.id(), conn);
        true
    }

    /// Remove a subscriber. Idempotent.
    pub fn remove_subscriber(&mut self, id: ConnectionId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    /// Point-in-time copy of the subscriber set.
    pub fn subscriber_snapshot(&self) -> Vec<Connection> {
        self.subscribers.values().cloned().collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
