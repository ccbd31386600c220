//! Now-playing relay.
//!
//! One authenticated producer (the bot) pushes state over a WebSocket; any
//! number of subscribers (browsers) receive it. The last state is cached for
//! late joiners. A command bridge lets HTTP callers send actions back to the
//! producer.

pub mod bridge;
pub mod cache;
pub mod config;
pub mod connection;
pub mod error;
pub mod hub;
pub mod registry;
pub mod server;

pub use bridge::{ActionPolicy, CommandBridge};
pub use config::{Cli, Config};
pub use connection::Connection;
pub use error::{BridgeError, ConfigError, RelayError};
pub use hub::Hub;
