//! Message schemas exchanged with the orchestrator

use crate::error::{IpcError, IpcResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use rmpv::Value;

/// A string-keyed mapping of arbitrary values (context, inputs, results)
pub type Fields = BTreeMap<String, Value>;

/// Initial payload of a session: carried context plus input data.
///
/// Both fields are optional on the wire. A missing or wrongly shaped field
/// decodes to an empty mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Envelope {
    pub context: Fields,
    pub inputs: Fields,
}

impl Envelope {
    pub fn new(context: Fields, inputs: Fields) -> Self {
        Self { context, inputs }
    }

    /// Interpret a decoded value as an envelope.
    ///
    /// The top level must be a mapping or nil; nil is an empty envelope and
    /// anything else is a decode error.
    pub fn from_value(value: Value) -> IpcResult<Self> {
        if value.is_nil() {
            return Ok(Envelope::default());
        }
        let Value::Map(entries) = value else {
            return Err(IpcError::DecodeError(format!(
                "envelope must be a map, got {}",
                value
            )));
        };

        let mut envelope = Envelope::default();
        for (key, field) in entries {
            match key.as_str() {
                Some("context") => envelope.context = fields_from_value(field).unwrap_or_default(),
                Some("inputs") => envelope.inputs = fields_from_value(field).unwrap_or_default(),
                _ => {}
            }
        }

        Ok(envelope)
    }
}

/// Convert a value into [`Fields`] if it is a map with only string keys
pub fn fields_from_value(value: Value) -> Option<Fields> {
    let Value::Map(entries) = value else {
        return None;
    };

    entries
        .into_iter()
        .map(|(key, value)| match key {
            Value::String(s) => s.into_str().map(|k| (k, value)),
            _ => None,
        })
        .collect()
}

/// Convert [`Fields`] into a map value
pub fn fields_to_value(fields: &Fields) -> Value {
    Value::Map(
        fields
            .iter()
            .map(|(k, v)| (Value::from(k.as_str()), v.clone()))
            .collect(),
    )
}

/// Per-call identifier matching a response to its request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    /// Fresh token: 4 random bytes as 8 lowercase hex characters
    pub fn generate() -> Self {
        let bytes: [u8; 4] = rand::random();
        Self(bytes.iter().map(|b| format!("{:02x}", b)).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CorrelationToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Messages sent from the worker to the orchestrator (stream mode)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Synchronous remote procedure call
    Call {
        function: String,
        inputs: Fields,
        id: CorrelationToken,
    },

    /// Final context; ends the session
    Respond { context: Fields },
}

/// Messages sent from the orchestrator in reply to a call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorMessage {
    CallResult {
        id: CorrelationToken,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<Value>,
    },
}

impl OrchestratorMessage {
    /// Parse a raw decoded value, keeping the raw value for diagnostics
    pub fn from_value(value: &Value) -> IpcResult<Self> {
        crate::codec::from_value(value).map_err(|e| {
            IpcError::unexpected(format!("malformed response: {}", e), value.clone())
        })
    }
}

/// Interpretation of a matched call result.
///
/// A string `error` always wins, even when `result` is also present. A
/// non-map `result` is treated as no result.
pub fn call_outcome(result: Option<Value>, error: Option<Value>) -> IpcResult<Option<Fields>> {
    if let Some(Value::String(message)) = error {
        let message = message
            .into_str()
            .unwrap_or_else(|| "remote error with invalid UTF-8 message".to_string());
        return Err(IpcError::RemoteError(message));
    }

    Ok(result.and_then(fields_from_value))
}
