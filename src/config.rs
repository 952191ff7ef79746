//! Configuration management for the RAX FTPS control server
//!
//! Loaded once at startup from `config.toml`, with `RAX_FTPS_*`
//! environment variables taking precedence.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::security::ClientAuth;

/// Complete server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// IP address to bind the FTP control connection
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port for FTP control connection
    #[serde(default = "default_control_port")]
    pub control_port: u16,

    /// Name reported for the listener in logs
    #[serde(default = "default_listener_name")]
    pub listener_name: String,

    /// Maximum concurrent clients
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,

    /// Seconds without a command before a session is closed (0 disables)
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Maximum FTP command length in bytes, line terminator included
    #[serde(default = "default_max_command_length")]
    pub max_command_length: usize,

    /// Speak TLS from the first byte instead of waiting for `AUTH`
    #[serde(default)]
    pub implicit_tls: bool,

    /// TLS material; without it `AUTH` is refused
    #[serde(default)]
    pub ssl: Option<SslConfig>,
}

/// The `[ssl]` table
#[derive(Debug, Deserialize, Clone)]
pub struct SslConfig {
    /// PEM certificate chain presented by the server
    pub certificate: PathBuf,

    /// PEM private key for `certificate`
    pub private_key: PathBuf,

    /// PEM bundle of CAs trusted for client certificates
    #[serde(default)]
    pub client_ca: Option<PathBuf>,

    #[serde(default)]
    pub client_auth: ClientAuth,

    /// Cipher suite names to enable, e.g. `TLS13_AES_256_GCM_SHA384`
    #[serde(default)]
    pub cipher_suites: Option<Vec<String>>,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_control_port() -> u16 {
    2121
}

fn default_listener_name() -> String {
    "default".to_string()
}

fn default_max_clients() -> usize {
    10
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_max_command_length() -> usize {
    4096
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            control_port: default_control_port(),
            listener_name: default_listener_name(),
            max_clients: default_max_clients(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_command_length: default_max_command_length(),
            implicit_tls: false,
            ssl: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from config.toml with environment overrides
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from `path` (extension optional); a missing file
    /// falls back to defaults plus environment overrides.
    pub fn load_from(path: &str) -> Result<Self, config::ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("RAX_FTPS")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validation for all configuration values
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.control_port == 0 {
            return Err(config::ConfigError::Message(
                "Control port cannot be 0".into(),
            ));
        }

        if self.max_clients == 0 {
            return Err(config::ConfigError::Message(
                "max_clients must be greater than 0".into(),
            ));
        }

        if self.max_command_length < 16 {
            return Err(config::ConfigError::Message(
                "max_command_length must be at least 16 bytes".into(),
            ));
        }

        if self.implicit_tls && self.ssl.is_none() {
            return Err(config::ConfigError::Message(
                "implicit_tls requires an [ssl] section".into(),
            ));
        }

        Ok(())
    }

    /// Get bind address and control port as socket address
    pub fn control_socket(&self) -> String {
        format!("{}:{}", self.bind_address, self.control_port)
    }

    /// Idle timeout, `None` when disabled
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}
