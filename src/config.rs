//! Server configuration.
//!
//! Loaded from a TOML, JSON or YAML file, then overridden by command-line
//! flags.
//! Every key is optional; missing keys take the defaults below.
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 8080
//! root_dir = "/srv/ftp"
//! start_dir = "/"
//! max_frame_size = 65535
//! max_message_type = 2048
//! max_send_queue = 1000
//! io_threads = 0
//! log_level = "info"
//! log_file = "/var/log/flashftp.log"
//! ```

use crate::connection::{SessionSettings, DEFAULT_MAX_SEND_QUEUE};
use crate::fs::resolve_virtual;
use crate::protocol::codec::DEFAULT_MAX_MESSAGE_TYPE;
use crate::protocol::{FrameLimits, MAX_PAYLOAD_LEN};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unsupported config format: {0} (expected .toml, .json, .yaml or .yml)")]
    UnsupportedFormat(PathBuf),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Runtime configuration of the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Real directory served as virtual `/`
    pub root_dir: PathBuf,
    /// Initial virtual working directory, also the target of `~`
    pub start_dir: String,
    /// Largest accepted inbound payload
    pub max_frame_size: usize,
    /// Largest accepted inbound type tag
    pub max_message_type: u16,
    /// Outbound frames queued per session before new ones are dropped
    pub max_send_queue: usize,
    /// Number of I/O loops, 0 for one per CPU
    pub io_threads: usize,
    /// Default tracing filter directive
    pub log_level: String,
    /// Also append logs to this file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: crate::DEFAULT_HOST.to_string(),
            port: crate::DEFAULT_PORT,
            root_dir: PathBuf::from("/"),
            start_dir: "/".to_string(),
            max_frame_size: MAX_PAYLOAD_LEN,
            max_message_type: DEFAULT_MAX_MESSAGE_TYPE,
            max_send_queue: DEFAULT_MAX_SEND_QUEUE,
            io_threads: 0,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl ServerConfig {
    /// Loads a config file, choosing the format by extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        let read = || {
            std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        };

        let config: ServerConfig = match ext.as_deref() {
            Some("toml") => toml::from_str(&read()?)?,
            Some("json") => serde_json::from_str(&read()?)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&read()?)?,
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_frame_size == 0 || self.max_frame_size > MAX_PAYLOAD_LEN {
            return Err(ConfigError::Invalid(format!(
                "max_frame_size must be between 1 and {}, got {}",
                MAX_PAYLOAD_LEN, self.max_frame_size
            )));
        }
        if self.max_send_queue == 0 {
            return Err(ConfigError::Invalid(
                "max_send_queue must be greater than 0".to_string(),
            ));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".to_string()));
        }
        if !self.root_dir.is_absolute() {
            return Err(ConfigError::Invalid(format!(
                "root_dir must be an absolute path, got {}",
                self.root_dir.display()
            )));
        }
        Ok(())
    }

    /// Address to bind, as `host:port`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn frame_limits(&self) -> FrameLimits {
        FrameLimits {
            max_frame_size: self.max_frame_size,
            max_message_type: self.max_message_type,
        }
    }

    /// Normalized virtual start directory.
    pub fn start_dir(&self) -> String {
        resolve_virtual("/", &self.start_dir, "/")
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            max_send_queue: self.max_send_queue,
            start_dir: self.start_dir(),
        }
    }

    /// Number of I/O loops to start.
    pub fn io_threads(&self) -> usize {
        if self.io_threads == 0 {
            num_cpus::get().max(1)
        } else {
            self.io_threads
        }
    }
}
