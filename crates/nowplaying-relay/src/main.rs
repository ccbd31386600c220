//! Relay server binary.
//!
//! Run:
//!   API_SECRET=changeme cargo run -p nowplaying-relay -- --listen 127.0.0.1:8000
//!
//! The bot connects to `ws://host/ws/nowplaying` with an `x-api-token`
//! header; browsers connect to the same path without one.

use clap::Parser;
use nowplaying_relay::{Cli, Config, server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli)?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(config.log.parse()?))
        .init();

    tracing::info!("Starting now-playing relay on {}", config.listen);
    server::run(config).await
}
