//! Server configuration, loaded from TOML.
//!
//! ```toml
//! name = "TM"
//! # shard = "abc123"   # random when omitted
//!
//! [heartbeat]
//! interval = "15s"
//!
//! [metrics]
//! app = "greenroom"
//! collect_interval = "1s"
//! flush_interval = "10s"
//!
//! [database]
//! url = "sqlite://greenroom.db"
//! max_connections = 4
//!
//! [audit]
//! enabled = true
//! root = "./commands"
//! ```
//!
//! Every section and field is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use greenroom_protocol::Shard;
use greenroom_session::SessionConfig;
use greenroom_stats::DatabaseConfig;
use serde::Deserialize;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration of one theater server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server name, used in metric tags (`theaterManager-<name>`) and as
    /// the lobby name.
    pub name: String,
    /// Fixed shard id. A random one is generated when unset.
    pub shard: Option<String>,
    pub heartbeat: HeartbeatConfig,
    pub metrics: MetricsConfig,
    pub database: DatabaseConfig,
    pub audit: AuditConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "TM".to_string(),
            shard: None,
            heartbeat: HeartbeatConfig::default(),
            metrics: MetricsConfig::default(),
            database: DatabaseConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Upper bound of the random delay before a session's first probe.
    #[serde(with = "humantime_serde")]
    pub jitter: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            jitter: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// `app` tag on every point.
    pub app: String,
    /// `version` tag on every point.
    pub version: String,
    #[serde(with = "humantime_serde")]
    pub collect_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            app: "greenroom".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            collect_interval: Duration::from_secs(1),
            flush_interval: Duration::from_secs(10),
        }
    }
}

/// Where request/answer records are written.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    pub root: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            root: PathBuf::from("./commands"),
        }
    }
}

impl ServerConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    /// [`ConfigError::Parse`] on malformed TOML or mistyped fields.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    /// [`ConfigError::Read`] if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// The configured shard, or a fresh random one.
    pub fn shard(&self) -> Shard {
        match &self.shard {
            Some(shard) => Shard::new(shard.clone()),
            None => Shard::random(),
        }
    }

    /// Session settings derived from the heartbeat section.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            heartbeat_interval: self.heartbeat.interval,
            heartbeat_jitter: self.heartbeat.jitter,
            ..SessionConfig::default()
        }
    }
}
