// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Log level
    pub log_level: String,
    /// Allowed CORS origin for the HTTP surface
    pub cors_origin: String,
    /// Capacity of each connection's outbound event queue
    pub channel_capacity: usize,
    /// Upper bound on a single persistence-gateway call, in milliseconds
    pub persist_timeout_ms: u64,
    /// Upper bound on a single meeting-provider call, in milliseconds
    pub provider_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5001".parse().unwrap(),
            log_level: "info".to_string(),
            cors_origin: "http://localhost:5173".to_string(),
            channel_capacity: 32,
            persist_timeout_ms: 5_000,
            provider_timeout_ms: 10_000,
        }
    }
}

impl Settings {
    /// Load settings from the default config file (if present) and the
    /// environment (`TASKHIVE__*` variables override file values).
    pub fn load() -> Result<Self> {
        Self::load_from("config/default.toml")
    }

    /// Load settings from an explicit config file path plus the environment.
    pub fn load_from(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("TASKHIVE").separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.persist_timeout_ms)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }
}
