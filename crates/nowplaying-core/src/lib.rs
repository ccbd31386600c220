//! Core types for the now-playing relay.
//!
//! This crate provides the wire framing shared by the relay and its peers.
//! Producer state payloads stay opaque; only the envelope fields the relay
//! routes on are modelled here.

mod command;
mod envelope;
mod secret;

pub use command::Command;
pub use envelope::{EnvelopeError, ProducerFrame, SubscriberRequest, heartbeat_ack};
pub use secret::{SecretError, SharedSecret};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role assigned to a connection at handshake time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The single authenticated state source.
    Producer,
    /// A passive consumer of broadcast state.
    Subscriber,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Producer => f.write_str("producer"),
            Role::Subscriber => f.write_str("subscriber"),
        }
    }
}

/// Connection lifecycle state. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    /// Upgraded but not yet registered with the hub.
    Connecting,
    /// Registered and exchanging messages.
    Active,
    /// Terminal.
    Closed,
}
