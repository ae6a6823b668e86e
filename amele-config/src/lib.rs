//! Configuration for Amele workers
//!
//! This crate reads the orchestrator-provided environment into typed
//! configuration domains, with validation and defaults.

pub mod domains;
pub mod error;
pub mod loader;
pub mod validation;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, MODE_VAR};

// Re-export domain configurations
pub use domains::{
    logging::{LogFormat, LogLevel, LoggingConfig},
    transport::{CommunicationMode, TransportConfig},
    AmeleConfig,
};
