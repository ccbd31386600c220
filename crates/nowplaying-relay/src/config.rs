//! Relay configuration: optional TOML file, overridden by flags and env.

use crate::bridge::ActionPolicy;
use crate::error::ConfigError;
use clap::Parser;
use nowplaying_core::SharedSecret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Used when neither the file, the flag, nor the env provides a secret.
pub const DEFAULT_SECRET: &str = "default-secret";
pub const DEFAULT_LISTEN: ([u8; 4], u16) = ([127, 0, 0, 1], 8000);
pub const DEFAULT_LOG: &str = "nowplaying_relay=info";

#[derive(Debug, Parser)]
#[command(name = "nowplaying-relay", about = "Relay now-playing state from a bot to browsers")]
pub struct Cli {
    /// Path to a TOML config file.
    #[arg(long, env = "NOWPLAYING_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long, env = "RELAY_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Shared secret the bot presents in `x-api-token`.
    #[arg(long, env = "API_SECRET", hide_env_values = true)]
    pub api_secret: Option<String>,
}

/// On-disk config shape. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    listen: Option<SocketAddr>,
    api_secret: Option<String>,
    allowed_origins: Vec<String>,
    bridge: BridgeConfig,
    log: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct BridgeConfig {
    allowed_actions: Vec<String>,
}

/// Resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub api_secret: SharedSecret,
    /// Browser origins allowed by CORS. Empty allows any origin.
    pub allowed_origins: Vec<String>,
    pub action_policy: ActionPolicy,
    /// Default tracing directive, applied on top of `RUST_LOG`.
    pub log: String,
}

impl Config {
    /// Resolve from the command line, reading the config file if one is named.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => read_file(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(file, cli)
    }

    /// Parse a TOML document with no command line overrides.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(text)?;
        let no_overrides = Cli {
            config: None,
            listen: None,
            api_secret: None,
        };
        Self::resolve(file, &no_overrides)
    }

    fn resolve(file: FileConfig, cli: &Cli) -> Result<Self, ConfigError> {
        let api_secret = cli
            .api_secret
            .as_deref()
            .or(file.api_secret.as_deref())
            .unwrap_or(DEFAULT_SECRET)
            .parse::<SharedSecret>()?;
        Ok(Self {
            listen: cli
                .listen
                .or(file.listen)
                .unwrap_or_else(|| SocketAddr::from(DEFAULT_LISTEN)),
            api_secret,
            allowed_origins: file.allowed_origins,
            action_policy: ActionPolicy::from_list(&file.bridge.allowed_actions),
            log: file.log.unwrap_or_else(|| DEFAULT_LOG.to_string()),
        })
    }

    pub fn uses_default_secret(&self) -> bool {
        self.api_secret.matches(Some(DEFAULT_SECRET))
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&text)?)
}
