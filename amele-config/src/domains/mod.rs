//! Domain-specific configuration modules

pub mod logging;
pub mod transport;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main Amele configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AmeleConfig {
    /// Orchestrator transport configuration
    #[serde(default)]
    pub transport: transport::TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl AmeleConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.transport.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}
