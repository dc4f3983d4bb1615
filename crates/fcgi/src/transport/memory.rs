use std::io::{self, Cursor, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing::trace;

use crate::transport::{Connection, Transport};

/// Observes what a [`MemoryConnection`] wrote after it has been handed off.
#[derive(Debug, Clone, Default)]
pub struct OutputProbe {
    output: Arc<Mutex<Vec<u8>>>,
    finished: Arc<AtomicBool>,
}

impl OutputProbe {
    pub fn output(&self) -> Vec<u8> {
        self.output.lock().map(|output| output.clone()).unwrap_or_default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

/// A connection backed by memory: a fixed environment and body, and a shared output buffer.
#[derive(Debug)]
pub struct MemoryConnection {
    environment: Vec<String>,
    input: Cursor<Bytes>,
    probe: OutputProbe,
    fail_writes: bool,
}

impl MemoryConnection {
    pub fn new<I, S>(environment: I, input: impl Into<Bytes>) -> (Self, OutputProbe)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let probe = OutputProbe::default();
        let connection = Self {
            environment: environment.into_iter().map(Into::into).collect(),
            input: Cursor::new(input.into()),
            probe: probe.clone(),
            fail_writes: false,
        };
        (connection, probe)
    }

    /// Makes every write fail with a broken pipe, as if the web server went away
    #[must_use]
    pub fn with_failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }
}

impl Connection for MemoryConnection {
    fn environment(&self) -> &[String] {
        &self.environment
    }

    fn read_input(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }

    fn write_output(&mut self, data: &[u8]) -> io::Result<()> {
        if self.probe.is_finished() {
            return Err(io::Error::other("connection already finished"));
        }
        if self.fail_writes {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }

        let mut output = self.probe.output.lock().map_err(|_poisoned| io::Error::other("output buffer poisoned"))?;
        output.extend_from_slice(data);
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.probe.finished.store(true, Ordering::Release);
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.probe.is_finished()
    }
}

enum Incoming {
    Connection(MemoryConnection),
    Shutdown,
}

/// The sending side of a [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct MemoryClient {
    sender: Sender<Incoming>,
}

impl MemoryClient {
    /// Queues a request for the transport to accept.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport has been dropped.
    pub fn connect<I, S>(&self, environment: I, input: impl Into<Bytes>) -> io::Result<OutputProbe>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (connection, probe) = MemoryConnection::new(environment, input);
        self.sender
            .send(Incoming::Connection(connection))
            .map_err(|_closed| io::Error::from(io::ErrorKind::ConnectionRefused))?;
        Ok(probe)
    }
}

/// An in-process [`Transport`]: [`MemoryClient::connect`] plays the web server.
#[derive(Debug)]
pub struct MemoryTransport {
    incoming: Mutex<Receiver<Incoming>>,
    sender: Sender<Incoming>,
    closed: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> (Self, MemoryClient) {
        let (sender, receiver) = mpsc::channel();
        let transport = Self { incoming: Mutex::new(receiver), sender: sender.clone(), closed: AtomicBool::new(false) };
        (transport, MemoryClient { sender })
    }
}

impl Transport for MemoryTransport {
    fn accept(&self) -> io::Result<Box<dyn Connection>> {
        let aborted = || io::Error::new(io::ErrorKind::ConnectionAborted, "transport shut down");
        if self.closed.load(Ordering::Acquire) {
            return Err(aborted());
        }

        let incoming = self.incoming.lock().map_err(|_poisoned| io::Error::other("transport poisoned"))?;
        match incoming.recv() {
            Ok(Incoming::Connection(connection)) if !self.closed.load(Ordering::Acquire) => {
                trace!("memory connection accepted");
                Ok(Box::new(connection))
            }
            _ => Err(aborted()),
        }
    }

    fn shutdown(&self) -> io::Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.sender.send(Incoming::Shutdown);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Incoming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Incoming::Connection(_) => f.write_str("Connection"),
            Incoming::Shutdown => f.write_str("Shutdown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_round_trip() {
        let (mut connection, probe) = MemoryConnection::new(["A=1"], &b"body"[..]);
        assert_eq!(connection.environment(), &["A=1".to_string()]);

        let mut buf = [0u8; 8];
        assert_eq!(connection.read_input(&mut buf).unwrap(), 4);

        connection.write_output(b"out").unwrap();
        connection.finish().unwrap();
        assert!(probe.is_finished());
        assert_eq!(probe.output(), b"out");
        assert!(connection.write_output(b"more").is_err());
    }

    #[test]
    fn transport_accepts_in_order_then_shuts_down() {
        let (transport, client) = MemoryTransport::new();
        client.connect(["N=1"], Bytes::new()).unwrap();
        client.connect(["N=2"], Bytes::new()).unwrap();

        assert_eq!(transport.accept().unwrap().environment(), &["N=1".to_string()]);
        assert_eq!(transport.accept().unwrap().environment(), &["N=2".to_string()]);

        transport.shutdown().unwrap();
        assert!(transport.accept().is_err());
    }
}
