//! Worker-side client for the Amele orchestrator
//!
//! ```no_run
//! use amele_worker::{Client, Fields};
//!
//! # fn main() -> Result<(), amele_worker::IpcError> {
//! let mut client = Client::from_env()?;
//! let inputs = client.accept()?;
//!
//! let mut context = client.context().clone();
//! if let Some(result) = client.call_function("double", inputs)? {
//!     context.extend(result);
//! }
//!
//! client.respond(context)?;
//! # Ok(())
//! # }
//! ```

pub mod client;

pub use client::{Client, SessionState};

// Re-export the types worker programs handle directly
pub use amele_config::CommunicationMode;
pub use amele_ipc::{Fields, IpcError, IpcResult, Value};
