//! Configuration module for the GPST tunnel client
//!
//! This module provides TOML-based configuration parsing and validation.

use crate::error::{GpstError, Result};
use crate::tunnel::{ReconnectPolicy, DEFAULT_RECEIVE_BUFFER};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Gateway connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Gateway hostname or IP address
    pub hostname: String,
    /// Gateway port (usually 443)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Verify gateway certificate
    #[serde(default = "default_true")]
    pub verify_certificate: bool,
    /// TCP connect timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u32,
    /// PEM client certificate for TLS client authentication
    pub client_certificate: Option<String>,
    /// PEM private key matching `client_certificate`
    pub client_key: Option<String>,
}

/// Authentication settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Cookie from the login flow, `USER=...; AUTH=...`
    pub cookie: Option<String>,
}

/// Tunnel data plane settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Payload capacity of the receive buffer
    #[serde(default = "default_receive_buffer")]
    pub receive_buffer: usize,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            receive_buffer: DEFAULT_RECEIVE_BUFFER,
        }
    }
}

/// Reconnection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Negotiation attempts after the stream is lost
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

impl ReconnectConfig {
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.max_attempts,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Gateway configuration
    pub server: ServerConfig,
    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Tunnel configuration
    #[serde(default)]
    pub tunnel: TunnelConfig,
    /// Reconnection configuration
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| GpstError::Config(format!("Failed to read config file: {e}")))?;

        <Self as FromStr>::from_str(&contents)
    }

    /// Convert configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| GpstError::Config(format!("Failed to serialize config: {e}")))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.hostname.is_empty() {
            return Err(GpstError::Config(
                "Server hostname cannot be empty".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(GpstError::Config("Server port cannot be zero".to_string()));
        }

        if self.server.client_certificate.is_some() != self.server.client_key.is_some() {
            return Err(GpstError::Config(
                "Client certificate and key must be given together".to_string(),
            ));
        }

        if !(576..=DEFAULT_RECEIVE_BUFFER).contains(&self.tunnel.receive_buffer) {
            return Err(GpstError::Config(format!(
                "Receive buffer must be between 576 and {DEFAULT_RECEIVE_BUFFER}"
            )));
        }

        if self.reconnect.max_attempts == 0 {
            return Err(GpstError::Config(
                "Reconnect attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Configuration for `hostname` with every other setting defaulted
    pub fn for_gateway(hostname: &str) -> Self {
        Self {
            server: ServerConfig {
                hostname: hostname.to_string(),
                port: default_port(),
                verify_certificate: true,
                timeout: default_timeout(),
                client_certificate: None,
                client_key: None,
            },
            auth: AuthConfig::default(),
            tunnel: TunnelConfig::default(),
            reconnect: ReconnectConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl FromStr for Config {
    type Err = GpstError;

    fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| GpstError::Config(format!("Failed to parse TOML: {e}")))
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    443
}

fn default_timeout() -> u32 {
    30
}

fn default_receive_buffer() -> usize {
    DEFAULT_RECEIVE_BUFFER
}

fn default_max_attempts() -> u32 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}
