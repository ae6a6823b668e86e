//! Configuration error types

use thiserror::Error;

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Environment variable could not be interpreted
    #[error("Environment variable error: {0}")]
    EnvError(String),

    /// Required configuration is missing
    #[error("Missing configuration: {0}")]
    Missing(String),

    /// Validation error
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// Domain-specific configuration error
    #[error("Domain configuration error in {domain}: {message}")]
    DomainError { domain: String, message: String },
}

impl ConfigError {
    /// Build a missing-variable error for a fully qualified variable name
    pub fn missing_var(name: impl AsRef<str>) -> Self {
        ConfigError::Missing(format!("{} not set", name.as_ref()))
    }
}
