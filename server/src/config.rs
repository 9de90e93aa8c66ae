use std::time::Duration;

use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::ws::heartbeat::HeartbeatConfig;

/// Command-line flags. Every flag is optional so that only values actually
/// passed on the command line override the file and environment layers.
#[derive(Parser, Serialize, Clone, Debug, Default)]
#[command(name = "relay-server", version, about = "Presence and message relay server")]
pub struct Cli {
    /// Port to listen on [default: 4000]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, default_value = "./relay.toml")]
    #[serde(skip)]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip)]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, keys) [default: ./data]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// Shared HS256 secret used by the account service to sign tokens
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,

    /// Milliseconds between server pings [default: 5000]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping_interval_ms: Option<u64>,

    /// Milliseconds a peer has to answer a ping before it is evicted [default: 1000]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pong_timeout_ms: Option<u64>,

    /// Upper bound in milliseconds on token verification and message persistence [default: 10000]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collaborator_timeout_ms: Option<u64>,

    /// Browser origin allowed by CORS (repeatable)
    #[arg(long = "allowed-origin")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed_origins: Vec<String>,
}

/// Effective server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub json_logs: bool,
    pub data_dir: String,
    /// When unset, a random key is loaded from or generated in the data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
    pub ping_interval_ms: u64,
    pub pong_timeout_ms: u64,
    pub collaborator_timeout_ms: u64,
    pub allowed_origins: Vec<String>,
    /// Set from `--generate-config`; never read from files.
    #[serde(skip)]
    pub generate_config: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4000,
            bind_address: "0.0.0.0".to_string(),
            json_logs: false,
            data_dir: "./data".to_string(),
            jwt_secret: None,
            ping_interval_ms: 5000,
            pong_timeout_ms: 1000,
            collaborator_timeout_ms: 10_000,
            allowed_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:4000".to_string(),
            ],
            generate_config: false,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (RELAY_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        Self::layered(Cli::parse())
    }

    fn layered(cli: Cli) -> Result<Self, figment::Error> {
        let mut config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&cli.config))
            .merge(Env::prefixed("RELAY_"))
            .merge(Serialized::defaults(&cli))
            .extract()?;
        config.generate_config = cli.generate_config;
        config.validate()?;
        Ok(config)
    }

    /// Zero durations would make every connection's heartbeat or collaborator
    /// calls fail immediately.
    fn validate(&self) -> Result<(), figment::Error> {
        for (key, value) in [
            ("ping_interval_ms", self.ping_interval_ms),
            ("pong_timeout_ms", self.pong_timeout_ms),
            ("collaborator_timeout_ms", self.collaborator_timeout_ms),
        ] {
            if value == 0 {
                return Err(format!("{key} must be greater than zero").into());
            }
        }
        Ok(())
    }

    pub fn heartbeat(&self) -> HeartbeatConfig {
        HeartbeatConfig {
            ping_interval: Duration::from_millis(self.ping_interval_ms),
            pong_timeout: Duration::from_millis(self.pong_timeout_ms),
        }
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Relay Server Configuration
# Place this file at ./relay.toml or specify with --config <path>
# All settings can be overridden via environment variables (RELAY_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 4000)
# port = 4000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database and generated JWT key
# data_dir = "./data"

# HS256 secret shared with the account service that issues login tokens.
# Leave unset to use a random key stored in data_dir/jwt_secret.
# jwt_secret = ""

# ---- Heartbeat ----
# Clients must answer each ping within pong_timeout_ms or are evicted.
# ping_interval_ms = 5000
# pong_timeout_ms = 1000

# Upper bound on token verification and message persistence
# collaborator_timeout_ms = 10000

# ---- CORS ----
# allowed_origins = ["http://localhost:5173", "http://localhost:4000"]
"#
    .to_string()
}
