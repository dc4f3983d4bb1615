//! The transport seam between sockets and request processing.
//!
//! A [`Transport`] hands out one [`Connection`] per FastCGI request. The connection
//! exposes the CGI environment, the request body (STDIN) and the response stream
//! (STDOUT), and is finalized exactly once with [`Connection::finish`].
//!
//! Two implementations ship with the crate:
//!
//! - [`FcgiListener`] / [`FcgiConnection`]: FastCGI over a Unix domain or TCP socket
//! - [`MemoryTransport`] / [`MemoryConnection`]: in-process connections for tests and tools

use std::io;

mod connection;
mod listener;
mod memory;
mod stream;

pub use connection::FcgiConnection;
pub use listener::FcgiListener;
pub use listener::ListenAddress;
pub use memory::MemoryClient;
pub use memory::MemoryConnection;
pub use memory::MemoryTransport;
pub use memory::OutputProbe;
pub use stream::Stream;

/// One accepted request and its byte streams.
pub trait Connection: Send {
    /// The CGI environment as `KEY=VALUE` entries, in the order the web server sent them
    fn environment(&self) -> &[String];

    /// Reads request body bytes into `buf`, returning `0` at the end of the body.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying stream fails or breaks the protocol.
    fn read_input(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes all of `data` to the response stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream fails or the connection is already finished.
    fn write_output(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flushes and completes the response. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the final records can't be written.
    fn finish(&mut self) -> io::Result<()>;

    fn is_finished(&self) -> bool;
}

/// A source of connections, typically a listening socket.
pub trait Transport: Send + Sync {
    /// Blocks until the next request is ready.
    ///
    /// # Errors
    ///
    /// Returns an error when the listening socket fails or has been shut down.
    fn accept(&self) -> io::Result<Box<dyn Connection>>;

    /// Makes pending and future [`accept`](Transport::accept) calls return an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket could not be shut down.
    fn shutdown(&self) -> io::Result<()>;
}
