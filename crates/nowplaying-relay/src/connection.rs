//! Connection handles.
//!
//! A [`Connection`] is a cheap clonable handle onto one WebSocket. Outbound
//! frames go through an unbounded queue that the socket's own task drains, so
//! sending never waits on a slow peer.

use nowplaying_core::{ConnectionState, Role};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;

/// Process-unique connection identifier.
pub type ConnectionId = u64;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A frame queued for the socket task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(Arc<str>),
    /// Send a close frame and stop writing.
    Close,
}

/// Receiving half handed to the socket task.
pub type OutboundRx = mpsc::UnboundedReceiver<Outbound>;

#[derive(Debug)]
struct Shared {
    role: OnceLock<Role>,
    state: AtomicU8,
}

/// Handle used to address a connection. Holds no ownership of the socket.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Outbound>,
    shared: Arc<Shared>,
}

impl Connection {
    /// Open a new handle in the `Connecting` state.
    pub fn open() -> (Self, OutboundRx) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            tx,
            shared: Arc::new(Shared {
                role: OnceLock::new(),
                state: AtomicU8::new(encode(ConnectionState::Connecting)),
            }),
        };
        (conn, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Role, once the hub has classified the connection.
    pub fn role(&self) -> Option<Role> {
        self.shared.role.get().copied()
    }

    pub fn state(&self) -> ConnectionState {
        decode(self.shared.state.load(Ordering::Acquire))
    }

    /// Assign the role and move to `Active`. The first role assigned sticks.
    pub(crate) fn activate(&self, role: Role) -> Role {
        let role = *self.shared.role.get_or_init(|| role);
        self.advance(ConnectionState::Active);
        role
    }

    /// Queue a text frame.
    pub fn send(&self, text: Arc<str>) -> Result<(), SendError> {
        if self.state() == ConnectionState::Closed {
            return Err(SendError::Closed(self.id));
        }
        self.tx
            .send(Outbound::Text(text))
            .map_err(|_| SendError::Closed(self.id))
    }

    /// Mark closed and ask the socket task to send a close frame.
    pub fn close(&self) {
        self.advance(ConnectionState::Closed);
        let _ = self.tx.send(Outbound::Close);
    }

    fn advance(&self, to: ConnectionState) {
        let _ = self.shared.state.fetch_max(encode(to), Ordering::AcqRel);
    }
}

fn encode(state: ConnectionState) -> u8 {
    match state {
        ConnectionState::Connecting => 0,
        ConnectionState::Active => 1,
        ConnectionState::Closed => 2,
    }
}

fn decode(raw: u8) -> ConnectionState {
    match raw {
        0 => ConnectionState::Connecting,
        1 => ConnectionState::Active,
        _ => ConnectionState::Closed,
    }
}

/// Failure to queue a frame on a connection.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SendError {
    #[error("connection {0} is closed")]
    Closed(ConnectionId),
}
