//! Orchestrator transport configuration

use crate::error::{ConfigError, ConfigResult};
use crate::validation::Validatable;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// How the worker talks to the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommunicationMode {
    /// Persistent duplex TCP connection with call support
    Stream,
    /// One-shot inbox/outbox files, no calls
    #[default]
    Mailbox,
}

impl CommunicationMode {
    /// Resolve the mode from the raw selector value.
    ///
    /// `None` and the empty string select the mailbox. An unrecognized value
    /// falls back to the mailbox with a warning unless `strict` is set, in
    /// which case it is rejected.
    pub fn resolve(raw: Option<&str>, strict: bool) -> ConfigResult<Self> {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(CommunicationMode::Mailbox);
        };

        match raw.parse() {
            Ok(mode) => Ok(mode),
            Err(e) if strict => Err(e),
            Err(_) => {
                warn!(
                    "Unrecognized communication protocol '{}', falling back to mailbox mode",
                    raw
                );
                Ok(CommunicationMode::Mailbox)
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommunicationMode::Stream => "stream",
            CommunicationMode::Mailbox => "mailbox",
        }
    }
}

impl FromStr for CommunicationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tcp" | "stream" => Ok(CommunicationMode::Stream),
            "shmem" | "mailbox" | "file" => Ok(CommunicationMode::Mailbox),
            _ => Err(ConfigError::ValidationError(format!(
                "Unknown communication protocol: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for CommunicationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport configuration for the orchestrator session
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TransportConfig {
    /// Selected communication mode
    #[serde(default)]
    pub mode: CommunicationMode,

    /// Loopback port of the orchestrator (stream mode)
    pub tcp_port: Option<u16>,

    /// Envelope input file (mailbox mode)
    pub inbox_file: Option<PathBuf>,

    /// Final context output file (mailbox mode)
    pub outbox_file: Option<PathBuf>,

    /// Deadline for a single call response; `None` waits forever
    #[serde(with = "whole_seconds")]
    pub call_timeout: Option<Duration>,

    /// Deadline for dialing the orchestrator; `None` uses the OS default
    #[serde(with = "whole_seconds")]
    pub connect_timeout: Option<Duration>,

    /// Reject unrecognized mode selectors instead of falling back to mailbox
    pub strict_mode: bool,
}

impl TransportConfig {
    /// Stream-mode configuration for the given port
    pub fn stream(port: u16) -> Self {
        Self {
            mode: CommunicationMode::Stream,
            tcp_port: Some(port),
            ..Default::default()
        }
    }

    /// Mailbox-mode configuration for the given paths
    pub fn mailbox(inbox: Option<PathBuf>, outbox: Option<PathBuf>) -> Self {
        Self {
            mode: CommunicationMode::Mailbox,
            inbox_file: inbox,
            outbox_file: outbox,
            ..Default::default()
        }
    }

    /// Builder-style call deadline
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

impl Validatable for TransportConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.mode == CommunicationMode::Stream {
            match self.tcp_port {
                None => return Err(self.validation_error("tcp_port is required in stream mode")),
                Some(0) => return Err(self.validation_error("tcp_port must be nonzero")),
                Some(_) => {}
            }
        }

        for (path, field) in [(&self.inbox_file, "inbox_file"), (&self.outbox_file, "outbox_file")] {
            if path.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
                return Err(self.validation_error(format!("{} is set but empty", field)));
            }
        }

        for (timeout, field) in [
            (self.call_timeout, "call_timeout"),
            (self.connect_timeout, "connect_timeout"),
        ] {
            if timeout.is_some_and(|t| t.is_zero()) {
                return Err(self.validation_error(format!("{} must be nonzero", field)));
            }
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "transport"
    }
}

/// Optional durations as whole seconds, matching the `*_SECS` variables
mod whole_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}
