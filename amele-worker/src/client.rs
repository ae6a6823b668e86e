//! Worker-side session with the orchestrator
//!
//! A [`Client`] owns the transport and the context received at session start.
//! One client drives one session: a single `accept`, any number of
//! `call_function` round trips (stream mode only), then a single `respond`.

use amele_config::{AmeleConfig, CommunicationMode, ConfigLoader, TransportConfig};
use amele_ipc::transport::{self, Transport};
use amele_ipc::{codec, fields_from_value, fields_to_value, Fields, IpcError, IpcResult};
use log::{debug, error, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing received yet
    Uninitialized,
    /// Stream mode: envelope received, connection open for calls
    Connected,
    /// Mailbox mode: envelope read from the inbox
    Received,
    /// Final context delivered
    Closed,
    /// A session-ending error occurred
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Connected => "connected",
            SessionState::Received => "received",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Client facade used by worker programs
pub struct Client {
    config: TransportConfig,
    transport: Option<Box<dyn Transport>>,
    context: Fields,
    state: SessionState,
}

impl Client {
    /// Create a client; no IO happens until [`Client::accept`]
    pub fn new(config: AmeleConfig) -> Self {
        Self::with_transport_config(config.transport)
    }

    pub fn with_transport_config(config: TransportConfig) -> Self {
        Self {
            config,
            transport: None,
            context: Fields::new(),
            state: SessionState::Uninitialized,
        }
    }

    /// Create a client from the orchestrator-provided environment
    pub fn from_env() -> IpcResult<Self> {
        Ok(Self::new(ConfigLoader::new().from_env()?))
    }

    pub fn mode(&self) -> CommunicationMode {
        self.config.mode
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Receive the session envelope and return its inputs.
    ///
    /// The envelope's context becomes available through [`Client::context`].
    pub fn accept(&mut self) -> IpcResult<Fields> {
        match self.state {
            SessionState::Uninitialized => {}
            SessionState::Connected | SessionState::Received => {
                return Err(IpcError::AlreadyInitialized)
            }
            SessionState::Closed | SessionState::Failed => return Err(IpcError::SessionClosed),
        }

        let mut transport = match transport::open(&self.config) {
            Ok(transport) => transport,
            Err(e) => {
                error!("Failed to open {} transport: {}", self.config.mode, e);
                self.state = SessionState::Failed;
                return Err(e);
            }
        };

        let envelope = match transport.receive_envelope() {
            Ok(envelope) => envelope,
            Err(e) => {
                error!("Failed to receive envelope: {}", e);
                let _ = transport.close();
                self.state = SessionState::Failed;
                return Err(e);
            }
        };

        self.context = envelope.context;
        self.state = match transport.mode() {
            CommunicationMode::Stream => SessionState::Connected,
            CommunicationMode::Mailbox => SessionState::Received,
        };
        self.transport = Some(transport);

        info!("Session accepted in {} mode", self.config.mode);
        Ok(envelope.inputs)
    }

    /// Typed variant of [`Client::accept`]
    pub fn accept_as<T: DeserializeOwned>(&mut self) -> IpcResult<T> {
        let inputs = self.accept()?;
        codec::from_value(&fields_to_value(&inputs))
    }

    /// Context received at session start; empty before `accept`
    pub fn context(&self) -> &Fields {
        &self.context
    }

    /// Call a function on the orchestrator.
    ///
    /// `Ok(None)` means the orchestrator answered with neither a result nor
    /// an error. A [`IpcError::RemoteError`] leaves the session usable; every
    /// transport-level failure ends it.
    pub fn call_function(&mut self, name: &str, inputs: Fields) -> IpcResult<Option<Fields>> {
        if self.config.mode == CommunicationMode::Mailbox {
            return Err(IpcError::Capability(
                "calls are not supported in mailbox mode".to_string(),
            ));
        }

        let transport = self.active_transport()?;
        match transport.call(name, inputs) {
            Err(e) if e.is_fatal() => {
                error!("Call to '{}' ended the session: {}", name, e);
                self.fail();
                Err(e)
            }
            other => other,
        }
    }

    /// Typed variant of [`Client::call_function`].
    ///
    /// `inputs` must serialize to a map; the result is deserialized into `O`.
    pub fn call_as<I, O>(&mut self, name: &str, inputs: &I) -> IpcResult<Option<O>>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let inputs = fields_from_value(codec::to_value(inputs)?).ok_or_else(|| {
            IpcError::EncodeError("call inputs must serialize to a string-keyed map".to_string())
        })?;

        match self.call_function(name, inputs)? {
            Some(result) => codec::from_value(&fields_to_value(&result)).map(Some),
            None => Ok(None),
        }
    }

    /// Deliver the final context and end the session
    pub fn respond(&mut self, context: Fields) -> IpcResult<()> {
        match (self.state, self.config.mode) {
            (SessionState::Closed | SessionState::Failed, _) => return Err(IpcError::SessionClosed),
            (SessionState::Uninitialized, CommunicationMode::Stream) => {
                return Err(IpcError::NotInitialized)
            }
            // The outbox can be written without having read an inbox
            (SessionState::Uninitialized, CommunicationMode::Mailbox) => {
                self.transport = Some(transport::open(&self.config)?);
            }
            _ => {}
        }

        let transport = self.active_transport()?;
        match transport.respond(context) {
            Ok(()) => {
                debug!("Final context delivered");
                self.finish(SessionState::Closed)
            }
            Err(e) if e.is_fatal() => {
                error!("Failed to deliver final context: {}", e);
                self.fail();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn active_transport(&mut self) -> IpcResult<&mut Box<dyn Transport>> {
        match self.state {
            SessionState::Closed | SessionState::Failed => Err(IpcError::SessionClosed),
            _ => self.transport.as_mut().ok_or(IpcError::NotInitialized),
        }
    }

    fn finish(&mut self, state: SessionState) -> IpcResult<()> {
        self.state = state;
        match self.transport.take() {
            Some(mut transport) => transport.close(),
            None => Ok(()),
        }
    }

    fn fail(&mut self) {
        if let Err(e) = self.finish(SessionState::Failed) {
            debug!("Error while closing failed session: {}", e);
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("mode", &self.config.mode)
            .field("state", &self.state)
            .field("context_fields", &self.context.len())
            .finish()
    }
}
