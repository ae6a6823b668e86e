//! Configuration loading and environment variable handling

use crate::domains::logging::{LogFormat, LogLevel, LoggingConfig};
use crate::domains::transport::{CommunicationMode, TransportConfig};
use crate::domains::AmeleConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::PathBuf;
use std::time::Duration;

/// Unprefixed mode selector shared with the orchestrator
pub const MODE_VAR: &str = "COMMUNICATION_PROTOCOL";

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "AMELE".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<AmeleConfig> {
        let mut config = AmeleConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Fully qualified name of a prefixed variable
    pub fn var_name(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut AmeleConfig) -> ConfigResult<()> {
        self.apply_transport_overrides(&mut config.transport)?;
        self.apply_logging_overrides(&mut config.logging)?;
        Ok(())
    }

    /// Apply transport config overrides
    fn apply_transport_overrides(&self, config: &mut TransportConfig) -> ConfigResult<()> {
        if let Some(strict) = self.get_env_var("STRICT_MODE") {
            config.strict_mode = strict
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid STRICT_MODE: {}", e)))?;
        }

        let raw_mode = non_empty(std::env::var(MODE_VAR).ok());
        config.mode = CommunicationMode::resolve(raw_mode.as_deref(), config.strict_mode)?;

        if let Some(port) = self.get_env_var("TCP_PORT") {
            config.tcp_port = Some(
                port.trim()
                    .parse()
                    .map_err(|e| ConfigError::EnvError(format!("Invalid TCP_PORT: {}", e)))?,
            );
        }

        if config.mode == CommunicationMode::Stream && config.tcp_port.is_none() {
            return Err(ConfigError::missing_var(self.var_name("TCP_PORT")));
        }

        if let Some(inbox) = self.get_env_var("INBOX_FILE") {
            config.inbox_file = Some(PathBuf::from(inbox));
        }

        if let Some(outbox) = self.get_env_var("OUTBOX_FILE") {
            config.outbox_file = Some(PathBuf::from(outbox));
        }

        if let Some(timeout) = self.get_env_var("CALL_TIMEOUT_SECS") {
            config.call_timeout = Some(parse_seconds(&timeout, "CALL_TIMEOUT_SECS")?);
        }

        if let Some(timeout) = self.get_env_var("CONNECT_TIMEOUT_SECS") {
            config.connect_timeout = Some(parse_seconds(&timeout, "CONNECT_TIMEOUT_SECS")?);
        }

        Ok(())
    }

    /// Apply logging config overrides
    fn apply_logging_overrides(&self, config: &mut LoggingConfig) -> ConfigResult<()> {
        if let Some(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = log_level.parse::<LogLevel>()?;
        }

        if let Some(format) = self.get_env_var("LOG_FORMAT") {
            config.format = format.parse::<LogFormat>()?;
        }

        Ok(())
    }

    /// Get a non-empty environment variable with prefix
    fn get_env_var(&self, name: &str) -> Option<String> {
        non_empty(std::env::var(self.var_name(name)).ok())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_seconds(raw: &str, name: &str) -> ConfigResult<Duration> {
    let seconds: u64 = raw
        .trim()
        .parse()
        .map_err(|e| ConfigError::EnvError(format!("Invalid {}: {}", name, e)))?;
    Ok(Duration::from_secs(seconds))
}
