//! Request/response correlation over a duplex byte channel.
//!
//! One call is outstanding at a time: the request is written and the very
//! next message read is expected to be its result. No resynchronization is
//! attempted; any mismatch ends the session.

use crate::codec;
use crate::error::{IpcError, IpcResult};
use crate::protocol::{
    call_outcome, CorrelationToken, Envelope, Fields, OrchestratorMessage, Value, WorkerMessage,
};
use log::{debug, warn};
use std::io::{BufReader, Read, Write};

/// Synchronous call protocol bound to one reader/writer pair
pub struct Exchange<R, W> {
    reader: BufReader<R>,
    writer: W,
}

impl<R: Read, W: Write> Exchange<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Decode the session envelope, the first message on the channel
    pub fn receive_envelope(&mut self) -> IpcResult<Envelope> {
        let value = codec::read_message(&mut self.reader)?;
        let envelope = Envelope::from_value(value)?;
        debug!(
            "Received envelope with {} context and {} input fields",
            envelope.context.len(),
            envelope.inputs.len()
        );
        Ok(envelope)
    }

    /// Call a function on the orchestrator and wait for its result.
    ///
    /// Returns `Ok(None)` when the orchestrator answers with neither a result
    /// mapping nor an error.
    pub fn call(&mut self, function: &str, inputs: Fields) -> IpcResult<Option<Fields>> {
        self.call_with_token(CorrelationToken::generate(), function, inputs)
    }

    pub(crate) fn call_with_token(
        &mut self,
        token: CorrelationToken,
        function: &str,
        inputs: Fields,
    ) -> IpcResult<Option<Fields>> {
        let request = WorkerMessage::Call {
            function: function.to_string(),
            inputs,
            id: token.clone(),
        };

        debug!("Sending call {} to function '{}'", token, function);
        codec::write_message(&mut self.writer, &request)?;

        let response = match codec::read_message(&mut self.reader) {
            Ok(value) => value,
            Err(IpcError::DecodeError(reason)) => {
                return Err(IpcError::unexpected(reason, Value::Nil));
            }
            Err(e) => return Err(e),
        };

        let OrchestratorMessage::CallResult { id, result, error } =
            OrchestratorMessage::from_value(&response)?;

        if id != token {
            warn!("Call {} answered with mismatched id {}", token, id);
            return Err(IpcError::unexpected(
                format!("expected id {}, got {}", token, id),
                response,
            ));
        }

        debug!("Received result for call {}", token);
        call_outcome(result, error)
    }

    /// Send the final context
    pub fn respond(&mut self, context: Fields) -> IpcResult<()> {
        debug!("Sending final context with {} fields", context.len());
        codec::write_message(&mut self.writer, &WorkerMessage::Respond { context })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::fields_to_value;
    use std::io::Cursor;

    fn fields(entries: &[(&str, i64)]) -> Fields {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect()
    }

    fn call_result(id: &str, result: Option<Fields>, error: Option<&str>) -> Vec<u8> {
        let message = OrchestratorMessage::CallResult {
            id: CorrelationToken::from(id),
            result: result.as_ref().map(fields_to_value),
            error: error.map(Value::from),
        };
        codec::encode(&message).unwrap()
    }

    fn exchange(incoming: Vec<u8>) -> Exchange<Cursor<Vec<u8>>, Vec<u8>> {
        Exchange::new(Cursor::new(incoming), Vec::new())
    }

    fn sent_messages(exchange: &Exchange<Cursor<Vec<u8>>, Vec<u8>>) -> Vec<WorkerMessage> {
        let mut cursor = Cursor::new(exchange.writer.clone());
        let mut messages = Vec::new();
        while (cursor.position() as usize) < exchange.writer.len() {
            let value = codec::read_message(&mut cursor).unwrap();
            messages.push(codec::from_value(&value).unwrap());
        }
        messages
    }

    #[test]
    fn test_call_returns_matching_result() {
        let mut exchange = exchange(call_result("0000beef", Some(fields(&[("n", 10)])), None));

        let result = exchange
            .call_with_token(CorrelationToken::from("0000beef"), "double", fields(&[("n", 5)]))
            .unwrap();
        assert_eq!(result, Some(fields(&[("n", 10)])));

        assert_eq!(
            sent_messages(&exchange),
            vec![WorkerMessage::Call {
                function: "double".to_string(),
                inputs: fields(&[("n", 5)]),
                id: CorrelationToken::from("0000beef"),
            }]
        );
    }

    #[test]
    fn test_mismatched_id_is_unexpected() {
        let mut exchange = exchange(call_result("ffffffff", Some(fields(&[("n", 10)])), None));

        let err = exchange
            .call_with_token(CorrelationToken::from("0000beef"), "double", Fields::new())
            .unwrap_err();
        match err {
            IpcError::UnexpectedResponse { response, .. } => assert_ne!(response, Value::Nil),
            other => panic!("expected UnexpectedResponse, got {:?}", other),
        }
    }

    #[test]
    fn test_remote_error() {
        let mut exchange = exchange(call_result("0000beef", None, Some("division by zero")));

        let err = exchange
            .call_with_token(CorrelationToken::from("0000beef"), "divide", Fields::new())
            .unwrap_err();
        assert_eq!(err, IpcError::RemoteError("division by zero".to_string()));
    }

    #[test]
    fn test_remote_error_is_recoverable_for_next_call() {
        let mut incoming = call_result("00000001", None, Some("nope"));
        incoming.extend(call_result("00000002", Some(fields(&[("ok", 1)])), None));
        let mut exchange = exchange(incoming);

        assert!(exchange
            .call_with_token(CorrelationToken::from("00000001"), "f", Fields::new())
            .is_err());
        let second = exchange
            .call_with_token(CorrelationToken::from("00000002"), "f", Fields::new())
            .unwrap();
        assert_eq!(second, Some(fields(&[("ok", 1)])));
    }

    #[test]
    fn test_empty_result_is_success() {
        let mut exchange = exchange(call_result("0000beef", None, None));
        let result = exchange
            .call_with_token(CorrelationToken::from("0000beef"), "noop", Fields::new())
            .unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_hang_up_during_call() {
        let mut exchange = exchange(Vec::new());
        let err = exchange.call("double", Fields::new()).unwrap_err();
        assert_eq!(err, IpcError::ConnectionClosed);
    }

    #[test]
    fn test_truncated_response_is_unexpected() {
        // A map header and a string header, then nothing
        let mut exchange = exchange(vec![0x82, 0xa4]);

        let err = exchange.call("double", Fields::new()).unwrap_err();
        match &err {
            IpcError::UnexpectedResponse { response, .. } => assert_eq!(response, &Value::Nil),
            other => panic!("expected UnexpectedResponse, got {:?}", other),
        }
        assert!(err.is_fatal());
    }

    #[test]
    fn test_receive_envelope_then_respond() {
        let envelope = Envelope::new(fields(&[("x", 1)]), fields(&[("n", 5)]));
        let mut exchange = exchange(codec::encode(&envelope).unwrap());

        let received = exchange.receive_envelope().unwrap();
        assert_eq!(received, envelope);

        exchange.respond(fields(&[("x", 1), ("n", 10)])).unwrap();
        assert_eq!(
            sent_messages(&exchange),
            vec![WorkerMessage::Respond {
                context: fields(&[("x", 1), ("n", 10)]),
            }]
        );
    }
}
