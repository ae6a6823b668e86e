//! Fake orchestrator shared by the integration tests

#![allow(dead_code)]

use amele_ipc::{codec, IpcError, Value};
use std::net::{TcpListener, TcpStream};
use std::sync::Once;
use std::thread::{self, JoinHandle};

/// Keep test output quiet while still routing library logs
pub fn init_quiet_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = amele_logging::init_simple_tracing("warn");
    });
}

/// Build a map value from string keys
pub fn map(entries: Vec<(&str, Value)>) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(k, v)| (Value::from(k), v))
            .collect(),
    )
}

/// Look up a string key in a map value
pub fn field<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value
        .as_map()?
        .iter()
        .find(|(k, _)| k.as_str() == Some(key))
        .map(|(_, v)| v)
}

/// Reply to a call request with the given result, echoing its id
pub fn call_result(request: &Value, result: Value) -> Value {
    map(vec![
        ("type", Value::from("call_result")),
        ("id", field(request, "id").cloned().unwrap_or(Value::Nil)),
        ("result", result),
    ])
}

/// Reply to a call request with an orchestrator-side error
pub fn call_error(request: &Value, message: &str) -> Value {
    map(vec![
        ("type", Value::from("call_result")),
        ("id", field(request, "id").cloned().unwrap_or(Value::Nil)),
        ("error", Value::from(message)),
    ])
}

/// Single-connection orchestrator running on its own thread.
///
/// Sends `envelope` (when given) as soon as the worker connects, answers each
/// `call` with whatever the handler returns and records every message the
/// worker sends until the worker hangs up.
pub struct FakeOrchestrator {
    port: u16,
    handle: JoinHandle<Vec<Value>>,
}

impl FakeOrchestrator {
    pub fn spawn<F>(envelope: Option<Value>, mut handler: F) -> Self
    where
        F: FnMut(&Value) -> Value + Send + 'static,
    {
        Self::spawn_with(move |mut socket| {
            let mut received = Vec::new();

            let Some(envelope) = envelope else {
                return received;
            };
            codec::write_message(&mut socket, &envelope).expect("send envelope");

            loop {
                let message = match codec::read_message(&mut socket) {
                    Ok(message) => message,
                    Err(IpcError::ConnectionClosed) => break,
                    Err(e) => panic!("fake orchestrator read failed: {}", e),
                };
                received.push(message.clone());

                match field(&message, "type").and_then(Value::as_str) {
                    Some("call") => {
                        let reply = handler(&message);
                        codec::write_message(&mut socket, &reply).expect("send reply");
                    }
                    Some("respond") => break,
                    _ => {}
                }
            }

            received
        })
    }

    /// Run a scripted session on the accepted connection instead of the
    /// default call loop. The socket is dropped when `session` returns.
    pub fn spawn_with<F>(session: F) -> Self
    where
        F: FnOnce(TcpStream) -> Vec<Value> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake orchestrator");
        let port = listener.local_addr().expect("local addr").port();

        let handle = thread::spawn(move || {
            let (socket, _) = listener.accept().expect("accept worker");
            session(socket)
        });

        Self { port, handle }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Wait for the session to end and return everything the worker sent
    pub fn join(self) -> Vec<Value> {
        self.handle.join().expect("fake orchestrator panicked")
    }
}
