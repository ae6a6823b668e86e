//! Orchestrator message exchange for Amele workers
//!
//! This crate provides the MessagePack envelope codec, the synchronous
//! call/response protocol and the two transports (a persistent TCP stream
//! and one-shot mailbox files) a worker uses to talk to its orchestrator.

pub mod codec;
pub mod error;
pub mod exchange;
pub mod protocol;
pub mod transport;

// Re-export commonly used types
pub use error::{IpcError, IpcResult};
pub use exchange::Exchange;
pub use protocol::{
    fields_from_value, fields_to_value, CorrelationToken, Envelope, Fields, OrchestratorMessage,
    Value, WorkerMessage,
};
pub use transport::{MailboxTransport, StreamTransport, Transport};
