//! Configuration system for Brigade.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $BRIGADE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/brigade/config.toml
//!   3. ~/.config/brigade/config.toml
//!
//! The struct is built once at process start and handed into each
//! component constructor; nothing reads configuration ad hoc after that.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::codec::WireCodec;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrigadeConfig {
    pub broker: BrokerConfig,
    pub relay: RelayConfig,
    pub manager: ManagerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker endpoint. Consumed by whichever `Bus` implementation the
    /// process is wired with; the in-process bus ignores it.
    pub url: String,
    /// Payload encoding. Must agree across every process on the bus.
    pub codec: WireCodec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// How long to wait for an ack before resending a job, in ms.
    pub retry_interval_ms: u64,
    /// Total send attempts per hop before the job fails locally.
    pub max_tries: u32,
    /// Delay between publishing the departure notice and letting the
    /// process exit, in ms. Without it the notice never leaves.
    pub shutdown_grace_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Keepalive broadcast interval, in ms. 0 = disabled.
    pub keepalive_ms: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for BrigadeConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            relay: RelayConfig::default(),
            manager: ManagerConfig::default(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: "amqp://localhost".to_string(),
            codec: WireCodec::Json,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: 2000,
            max_tries: 5,
            shutdown_grace_ms: 500,
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self { keepalive_ms: 0 }
    }
}

impl RelayConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("brigade")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl BrigadeConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            BrigadeConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("BRIGADE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&BrigadeConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply BRIGADE_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("BRIGADE_BROKER__URL") {
            self.broker.url = v;
        }
        if let Ok(v) = std::env::var("BRIGADE_BROKER__CODEC") {
            match v.as_str() {
                "json" => self.broker.codec = WireCodec::Json,
                "msgpack" => self.broker.codec = WireCodec::Msgpack,
                _ => {}
            }
        }
        if let Ok(v) = std::env::var("BRIGADE_RELAY__RETRY_INTERVAL_MS") {
            if let Ok(ms) = v.parse() {
                self.relay.retry_interval_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("BRIGADE_RELAY__MAX_TRIES") {
            if let Ok(n) = v.parse() {
                self.relay.max_tries = n;
            }
        }
        if let Ok(v) = std::env::var("BRIGADE_RELAY__SHUTDOWN_GRACE_MS") {
            if let Ok(ms) = v.parse() {
                self.relay.shutdown_grace_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("BRIGADE_MANAGER__KEEPALIVE_MS") {
            if let Ok(ms) = v.parse() {
                self.manager.keepalive_ms = ms;
            }
        }
    }
}
