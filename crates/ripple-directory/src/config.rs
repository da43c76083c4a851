// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Directory server and client configuration.

use crate::transport::frame::DEFAULT_MAX_FRAME_SIZE;
use crate::transport::Endpoint;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Well-known command port.
pub const DEFAULT_COMMAND_PORT: u16 = 5555;

/// Well-known directory broadcast port.
pub const DEFAULT_BROADCAST_PORT: u16 = 5556;

/// Directory server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind both endpoints to (`*` for all interfaces)
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    /// Command (request/reply) port, 0 for ephemeral
    #[serde(default = "default_command_port")]
    pub command_port: u16,

    /// Snapshot broadcast port, 0 for ephemeral
    #[serde(default = "default_broadcast_port")]
    pub broadcast_port: u16,

    /// Maximum frame size (bytes)
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Snapshots a slow observer may lag behind before losing some
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

/// Client configuration shared by publishers, observers and subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Directory server host
    #[serde(default = "default_directory_host")]
    pub directory_host: String,

    /// Directory command port
    #[serde(default = "default_command_port")]
    pub command_port: u16,

    /// Directory broadcast port
    #[serde(default = "default_broadcast_port")]
    pub broadcast_port: u16,

    /// Timeout for one request/reply exchange (milliseconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Maximum frame size (bytes)
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Data-plane messages a slow subscriber may lag behind
    #[serde(default = "default_publish_capacity")]
    pub publish_capacity: usize,
}

fn default_bind_host() -> String {
    "*".to_string()
}

fn default_directory_host() -> String {
    "127.0.0.1".to_string()
}

fn default_command_port() -> u16 {
    DEFAULT_COMMAND_PORT
}

fn default_broadcast_port() -> u16 {
    DEFAULT_BROADCAST_PORT
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

fn default_broadcast_capacity() -> usize {
    64
}

fn default_publish_capacity() -> usize {
    1024
}

fn default_request_timeout() -> u64 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            command_port: default_command_port(),
            broadcast_port: default_broadcast_port(),
            max_message_size: default_max_message_size(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Command endpoint to bind.
    pub fn command_endpoint(&self) -> Endpoint {
        Endpoint::new(self.bind_host.clone(), self.command_port)
    }

    /// Broadcast endpoint to bind.
    pub fn broadcast_endpoint(&self) -> Endpoint {
        Endpoint::new(self.bind_host.clone(), self.broadcast_port)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_host.is_empty() {
            return Err(ConfigError::Invalid("bind_host cannot be empty".into()));
        }
        if self.command_port != 0 && self.command_port == self.broadcast_port {
            return Err(ConfigError::Invalid(
                "command_port and broadcast_port must differ".into(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::Invalid("max_message_size cannot be 0".into()));
        }
        if self.broadcast_capacity == 0 {
            return Err(ConfigError::Invalid(
                "broadcast_capacity cannot be 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            directory_host: default_directory_host(),
            command_port: default_command_port(),
            broadcast_port: default_broadcast_port(),
            request_timeout_ms: default_request_timeout(),
            max_message_size: default_max_message_size(),
            publish_capacity: default_publish_capacity(),
        }
    }
}

impl ClientConfig {
    /// Client configuration for a directory at `host` on the default ports.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            directory_host: host.into(),
            ..Default::default()
        }
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Directory command endpoint.
    pub fn command_endpoint(&self) -> Endpoint {
        Endpoint::new(self.directory_host.clone(), self.command_port)
    }

    /// Directory broadcast endpoint.
    pub fn broadcast_endpoint(&self) -> Endpoint {
        Endpoint::new(self.directory_host.clone(), self.broadcast_port)
    }

    /// Get request timeout as Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.directory_host.is_empty() {
            return Err(ConfigError::Invalid(
                "directory_host cannot be empty".into(),
            ));
        }
        if self.command_port == 0 || self.broadcast_port == 0 {
            return Err(ConfigError::Invalid("directory ports cannot be 0".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_ms cannot be 0".into(),
            ));
        }
        if self.max_message_size == 0 || self.publish_capacity == 0 {
            return Err(ConfigError::Invalid(
                "max_message_size and publish_capacity cannot be 0".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value: {0}")]
    Invalid(String),
}
