//! IPC transport implementations

use crate::codec;
use crate::error::{IpcError, IpcResult};
use crate::exchange::Exchange;
use crate::protocol::{Envelope, Fields};
use amele_config::{CommunicationMode, TransportConfig};
use log::{debug, info};
use std::io::Write;
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Transport trait for the two orchestrator communication modes
pub trait Transport {
    /// Mode this transport implements
    fn mode(&self) -> CommunicationMode;

    /// Receive the session envelope
    fn receive_envelope(&mut self) -> IpcResult<Envelope>;

    /// Perform a synchronous remote call
    fn call(&mut self, function: &str, inputs: Fields) -> IpcResult<Option<Fields>>;

    /// Deliver the final context
    fn respond(&mut self, context: Fields) -> IpcResult<()>;

    /// Release any held resources
    fn close(&mut self) -> IpcResult<()>;
}

/// Open the transport selected by the configuration.
///
/// Stream mode dials the orchestrator here; mailbox mode performs no IO.
pub fn open(config: &TransportConfig) -> IpcResult<Box<dyn Transport>> {
    match config.mode {
        CommunicationMode::Stream => Ok(Box::new(StreamTransport::connect(config)?)),
        CommunicationMode::Mailbox => Ok(Box::new(MailboxTransport::new(config))),
    }
}

/// Persistent TCP connection to the orchestrator
pub struct StreamTransport {
    exchange: Exchange<TcpStream, TcpStream>,
    control: TcpStream,
    call_timeout: Option<Duration>,
    closed: bool,
}

impl StreamTransport {
    /// Dial the orchestrator on the loopback interface
    pub fn connect(config: &TransportConfig) -> IpcResult<Self> {
        let port = config
            .tcp_port
            .ok_or_else(|| IpcError::ConfigError("tcp port not configured".to_string()))?;
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));

        let stream = match config.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        }
        .map_err(|e| IpcError::ConnectionError(format!("{}: {}", addr, e)))?;

        info!("Connected to orchestrator at {}", addr);
        Self::from_stream(stream, config.call_timeout)
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream, call_timeout: Option<Duration>) -> IpcResult<Self> {
        // Small request/response messages; don't wait to coalesce
        stream.set_nodelay(true)?;
        let reader = stream.try_clone()?;
        let control = stream.try_clone()?;

        Ok(Self {
            exchange: Exchange::new(reader, stream),
            control,
            call_timeout,
            closed: false,
        })
    }

    fn ensure_open(&self) -> IpcResult<()> {
        if self.closed {
            return Err(IpcError::SessionClosed);
        }
        Ok(())
    }
}

impl Transport for StreamTransport {
    fn mode(&self) -> CommunicationMode {
        CommunicationMode::Stream
    }

    fn receive_envelope(&mut self) -> IpcResult<Envelope> {
        self.ensure_open()?;
        let envelope = self.exchange.receive_envelope()?;
        // Only call responses are subject to the deadline
        self.control.set_read_timeout(self.call_timeout)?;
        Ok(envelope)
    }

    fn call(&mut self, function: &str, inputs: Fields) -> IpcResult<Option<Fields>> {
        self.ensure_open()?;
        self.exchange.call(function, inputs)
    }

    fn respond(&mut self, context: Fields) -> IpcResult<()> {
        self.ensure_open()?;
        self.exchange.respond(context)
    }

    fn close(&mut self) -> IpcResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        debug!("Closing orchestrator connection");
        match self.control.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != std::io::ErrorKind::NotConnected => Err(e.into()),
            _ => Ok(()),
        }
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// One-shot file exchange: envelope from the inbox, context to the outbox
pub struct MailboxTransport {
    inbox: Option<PathBuf>,
    outbox: Option<PathBuf>,
}

impl MailboxTransport {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            inbox: config.inbox_file.clone(),
            outbox: config.outbox_file.clone(),
        }
    }
}

impl Transport for MailboxTransport {
    fn mode(&self) -> CommunicationMode {
        CommunicationMode::Mailbox
    }

    fn receive_envelope(&mut self) -> IpcResult<Envelope> {
        let Some(inbox) = &self.inbox else {
            debug!("No inbox file configured, starting with empty inputs");
            return Ok(Envelope::default());
        };

        let bytes = std::fs::read(inbox).map_err(|e| {
            IpcError::IoError(format!("failed to read inbox {}: {}", inbox.display(), e))
        })?;
        debug!("Read {} bytes from inbox {}", bytes.len(), inbox.display());

        Envelope::from_value(codec::decode(&bytes)?)
    }

    fn call(&mut self, _function: &str, _inputs: Fields) -> IpcResult<Option<Fields>> {
        Err(IpcError::Capability(
            "calls are not supported in mailbox mode".to_string(),
        ))
    }

    fn respond(&mut self, context: Fields) -> IpcResult<()> {
        let outbox = self
            .outbox
            .as_deref()
            .ok_or_else(|| IpcError::ConfigError("outbox file not configured".to_string()))?;

        let bytes = codec::encode(&context)?;
        write_owner_only(outbox, &bytes)
            .map_err(|e| IpcError::IoError(format!("failed to write outbox {}: {}", outbox.display(), e)))?;

        debug!("Wrote {} bytes to outbox {}", bytes.len(), outbox.display());
        Ok(())
    }

    fn close(&mut self) -> IpcResult<()> {
        Ok(())
    }
}

/// Write `bytes` to `path` through a sibling temporary file, readable and
/// writable by the owner only, then rename it into place.
fn write_owner_only(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = tempfile::NamedTempFile::new_in(dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Value;
    use std::net::TcpListener;
    use std::thread;
    use tempfile::TempDir;

    fn fields(entries: &[(&str, i64)]) -> Fields {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect()
    }

    #[test]
    fn test_mailbox_without_inbox_is_empty() {
        let mut transport = MailboxTransport::new(&TransportConfig::mailbox(None, None));
        assert_eq!(transport.receive_envelope().unwrap(), Envelope::default());
    }

    #[test]
    fn test_mailbox_reads_inbox() {
        let dir = TempDir::new().unwrap();
        let inbox = dir.path().join("inbox.msgpack");
        let envelope = Envelope::new(Fields::new(), fields(&[("a", 1)]));
        std::fs::write(&inbox, codec::encode(&envelope).unwrap()).unwrap();

        let mut transport = MailboxTransport::new(&TransportConfig::mailbox(Some(inbox), None));
        assert_eq!(transport.receive_envelope().unwrap(), envelope);
    }

    #[test]
    fn test_mailbox_missing_inbox_is_io_error() {
        let dir = TempDir::new().unwrap();
        let inbox = dir.path().join("absent.msgpack");

        let mut transport = MailboxTransport::new(&TransportConfig::mailbox(Some(inbox), None));
        assert!(matches!(transport.receive_envelope(), Err(IpcError::IoError(_))));
    }

    #[test]
    fn test_mailbox_garbage_inbox_is_decode_error() {
        let dir = TempDir::new().unwrap();
        let inbox = dir.path().join("inbox.msgpack");
        // Map header promising one entry, key string cut short
        std::fs::write(&inbox, [0x81, 0xa7, b'c', b'o']).unwrap();

        let mut transport = MailboxTransport::new(&TransportConfig::mailbox(Some(inbox), None));
        assert!(matches!(transport.receive_envelope(), Err(IpcError::DecodeError(_))));
    }

    #[test]
    fn test_mailbox_calls_unsupported() {
        let mut transport = MailboxTransport::new(&TransportConfig::mailbox(None, None));
        assert!(matches!(
            transport.call("double", Fields::new()),
            Err(IpcError::Capability(_))
        ));
    }

    #[test]
    fn test_mailbox_respond_requires_outbox() {
        let mut transport = MailboxTransport::new(&TransportConfig::mailbox(None, None));
        assert!(matches!(
            transport.respond(Fields::new()),
            Err(IpcError::ConfigError(_))
        ));
    }

    #[test]
    fn test_mailbox_respond_writes_bare_context() {
        let dir = TempDir::new().unwrap();
        let outbox = dir.path().join("outbox.msgpack");

        let mut transport = MailboxTransport::new(&TransportConfig::mailbox(None, Some(outbox.clone())));
        transport.respond(fields(&[("a", 2)])).unwrap();

        let written = codec::decode(&std::fs::read(&outbox).unwrap()).unwrap();
        assert_eq!(written, crate::protocol::fields_to_value(&fields(&[("a", 2)])));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&outbox).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_stream_connect_failure() {
        // Bind then drop to get a port with nothing listening
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();

        let err = StreamTransport::connect(&TransportConfig::stream(port)).err().unwrap();
        assert!(matches!(err, IpcError::ConnectionError(_)));
    }

    #[test]
    fn test_stream_connect_failure_with_timeout() {
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();

        let config = TransportConfig::stream(port).with_connect_timeout(Duration::from_secs(2));
        let err = StreamTransport::connect(&config).err().unwrap();
        assert!(matches!(err, IpcError::ConnectionError(_)));
    }

    #[test]
    fn test_stream_connect_with_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let orchestrator = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            codec::write_message(&mut socket, &Envelope::new(fields(&[("x", 1)]), Fields::new()))
                .unwrap();
        });

        let config = TransportConfig::stream(port).with_connect_timeout(Duration::from_secs(2));
        let mut transport = StreamTransport::connect(&config).unwrap();
        assert_eq!(transport.receive_envelope().unwrap().context, fields(&[("x", 1)]));
        orchestrator.join().unwrap();
    }

    #[test]
    fn test_stream_call_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let orchestrator = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            codec::write_message(&mut socket, &Envelope::default()).unwrap();
            // Read the call but never answer it
            let _ = codec::read_message(&mut socket).unwrap();
            thread::sleep(Duration::from_millis(500));
        });

        let config = TransportConfig::stream(port).with_call_timeout(Duration::from_millis(100));
        let mut transport = StreamTransport::connect(&config).unwrap();
        transport.receive_envelope().unwrap();

        let err = transport.call("slow", Fields::new()).unwrap_err();
        assert_eq!(err, IpcError::Timeout);

        transport.close().unwrap();
        assert_eq!(
            transport.respond(Fields::new()),
            Err(IpcError::SessionClosed)
        );
        orchestrator.join().unwrap();
    }
}
