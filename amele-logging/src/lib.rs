//! Structured logging setup for Amele workers
//!
//! Library crates in this workspace log through the `log` facade; the
//! subscriber installed here bridges those records into `tracing` and writes
//! them to stderr, leaving stdout to the worker program.

pub mod init;

pub use init::{init_logging_from_config, init_simple_tracing};
