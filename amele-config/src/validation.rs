//! Per-domain consistency checks

use crate::error::{ConfigError, ConfigResult};

/// A configuration domain that can check itself after loading
pub trait Validatable {
    fn validate(&self) -> ConfigResult<()>;

    /// Name reported alongside validation failures
    fn domain_name(&self) -> &'static str;

    fn validation_error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::DomainError {
            domain: self.domain_name().to_string(),
            message: message.into(),
        }
    }
}
