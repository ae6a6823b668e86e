//! MessagePack framing.
//!
//! Messages are self-delimiting MessagePack values written back to back; a
//! reader consumes exactly one value per call and leaves the rest buffered.

use crate::error::{IpcError, IpcResult};
use crate::protocol::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};

/// Encode a message as MessagePack with named (map) fields
pub fn encode<T: Serialize + ?Sized>(message: &T) -> IpcResult<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(message)?)
}

/// Decode a complete buffer holding exactly one value
pub fn decode(bytes: &[u8]) -> IpcResult<Value> {
    let mut cursor = bytes;
    let value = rmpv::decode::read_value(&mut cursor).map_err(|e| match IpcError::from(e) {
        // A short buffer is truncated data, not a hang-up
        IpcError::ConnectionClosed if bytes.is_empty() => {
            IpcError::DecodeError("empty payload".to_string())
        }
        IpcError::ConnectionClosed => IpcError::DecodeError("truncated message".to_string()),
        other => other,
    })?;

    if !cursor.is_empty() {
        return Err(IpcError::DecodeError(format!(
            "{} trailing bytes after message",
            cursor.len()
        )));
    }

    Ok(value)
}

/// Convert a serializable type into a value, structs becoming maps
pub fn to_value<T: Serialize + ?Sized>(message: &T) -> IpcResult<Value> {
    decode(&encode(message)?)
}

/// Convert a value into a deserializable type
pub fn from_value<T: DeserializeOwned>(value: &Value) -> IpcResult<T> {
    rmp_serde::from_slice(&encode(value)?).map_err(|e| IpcError::DecodeError(e.to_string()))
}

/// Read one message from a stream.
///
/// End of stream before the first byte is [`IpcError::ConnectionClosed`];
/// end of stream inside a message is a decode error.
pub fn read_message<R: Read>(reader: &mut R) -> IpcResult<Value> {
    let mut counted = CountingReader { inner: reader, consumed: 0 };
    rmpv::decode::read_value(&mut counted).map_err(|e| match IpcError::from(e) {
        IpcError::ConnectionClosed if counted.consumed > 0 => {
            IpcError::DecodeError("truncated message".to_string())
        }
        other => other,
    })
}

struct CountingReader<'a, R> {
    inner: &'a mut R,
    consumed: usize,
}

impl<R: Read> Read for CountingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.consumed += n;
        Ok(n)
    }
}

/// Encode and write one message, then flush
pub fn write_message<W: Write, T: Serialize + ?Sized>(writer: &mut W, message: &T) -> IpcResult<()> {
    let bytes = encode(message)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}
