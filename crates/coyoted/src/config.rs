//! Daemon configuration.
//!
//! Configuration is loaded from the following sources (later sources
//! override earlier ones):
//!
//! 1. Built-in defaults
//! 2. `config.toml` (`--config <path>`, else `<config dir>/coyote/config.toml`)
//! 3. Environment variables (`OWNER_MAX_POWER`, `COYOTE_*`)
//!
//! ```toml
//! owner_max_power = 50
//! socket_path = "/tmp/coyote.sock"
//!
//! [device]
//! host = "0.0.0.0"
//! port = 4567
//! public_host = "coyote.example.net"
//! heartbeat_secs = 60
//! handshake_timeout_secs = 30
//! idle_timeout_secs = 180
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use coyote_core::limits::{AMPLITUDE_MAX, DEFAULT_OWNER_MAX};
use coyote_core::OwnerCap;

use crate::server::DEFAULT_SOCKET_PATH;
use crate::transport::TransportConfig;

/// Config file name inside the per-user config directory.
const CONFIG_FILE: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Top-level daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Cap on effective amplitude, 0..=100
    pub owner_max_power: u8,

    /// Control socket path
    pub socket_path: PathBuf,

    /// Device listener settings
    pub device: DeviceConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            owner_max_power: DEFAULT_OWNER_MAX,
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            device: DeviceConfig::default(),
        }
    }
}

/// `[device]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub host: String,
    pub port: u16,
    pub public_host: Option<String>,
    pub heartbeat_secs: u64,
    pub handshake_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4567,
            public_host: None,
            heartbeat_secs: 60,
            handshake_timeout_secs: 30,
            idle_timeout_secs: 180,
        }
    }
}

impl DaemonConfig {
    /// Default config file location, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("coyote").join(CONFIG_FILE))
    }

    /// Loads the file (if any), applies environment overrides and validates.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };

        config.apply_env_overrides(|var| env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies overrides, reading variables through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("OWNER_MAX_POWER") {
            self.owner_max_power = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv {
                    var: "OWNER_MAX_POWER",
                    value,
                })?;
        }
        if let Some(value) = lookup("COYOTE_SOCKET") {
            self.socket_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("COYOTE_WS_HOST") {
            self.device.host = value;
        }
        if let Some(value) = lookup("COYOTE_WS_PORT") {
            self.device.port = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv {
                    var: "COYOTE_WS_PORT",
                    value,
                })?;
        }
        if let Some(value) = lookup("COYOTE_PUBLIC_HOST") {
            self.device.public_host = Some(value).filter(|v| !v.trim().is_empty());
        }
        Ok(())
    }

    /// Rejects values the daemon cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.owner_max_power > AMPLITUDE_MAX {
            return Err(ConfigError::Invalid(format!(
                "owner_max_power must be 0..{AMPLITUDE_MAX} (got {})",
                self.owner_max_power
            )));
        }
        if self.device.heartbeat_secs == 0 {
            return Err(ConfigError::Invalid("heartbeat_secs must be > 0".into()));
        }
        if self.device.handshake_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "handshake_timeout_secs must be > 0".into(),
            ));
        }
        // The app's pong to a heartbeat must land before the idle deadline.
        if self.device.idle_timeout_secs < self.device.heartbeat_secs.saturating_mul(2) {
            return Err(ConfigError::Invalid(
                "idle_timeout_secs must be at least twice heartbeat_secs".into(),
            ));
        }
        if self.socket_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("socket_path is empty".into()));
        }
        Ok(())
    }

    /// Owner cap seeded from the configured value.
    pub fn owner_cap(&self) -> Result<OwnerCap, ConfigError> {
        OwnerCap::new(i64::from(self.owner_max_power))
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Settings for the device listener.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            host: self.device.host.clone(),
            port: self.device.port,
            public_host: self.device.public_host.clone(),
            heartbeat: Duration::from_secs(self.device.heartbeat_secs),
            handshake_timeout: Duration::from_secs(self.device.handshake_timeout_secs),
            idle_timeout: Duration::from_secs(self.device.idle_timeout_secs),
        }
    }
}
