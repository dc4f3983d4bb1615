//! A blocking FastCGI transport
//!
//! This crate speaks the application side of FastCGI 1.0 over Unix domain or TCP
//! sockets. It frames records with a `tokio_util` codec, reads each request's
//! PARAMS into a CGI environment, streams STDIN on demand and writes STDOUT back,
//! without any async runtime: one thread blocks in [`accept`](Transport::accept)
//! and hands out [`Connection`]s.
//!
//! # Example
//!
//! ```no_run
//! use micro_fcgi::{FcgiListener, ListenAddress, Transport};
//!
//! let listener = FcgiListener::bind(ListenAddress::parse("/tmp/app.sock")?, 16)?;
//! loop {
//!     let mut connection = listener.accept()?;
//!     for entry in connection.environment() {
//!         println!("{entry}");
//!     }
//!     connection.write_output(b"Status: 204 No Content\r\n\r\n")?;
//!     connection.finish()?;
//! }
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! # Architecture
//!
//! - [`protocol`]: record types, record bodies, name-value pairs and [`ProtocolError`]
//! - [`codec`]: [`RecordCodec`], the record framing
//! - [`transport`]: the [`Transport`]/[`Connection`] seam, the socket listener and
//!   the in-memory implementation used by tests
//!
//! # Limitations
//!
//! - Responder role only; Authorizer and Filter requests are refused with `FCGI_UNKNOWN_ROLE`
//! - One request per connection, no multiplexing; connections are closed after each response

pub mod codec;
pub mod protocol;
pub mod transport;

mod utils;
pub(crate) use utils::ensure;

pub use codec::RecordCodec;
pub use protocol::ProtocolError;
pub use transport::{
    Connection, FcgiConnection, FcgiListener, ListenAddress, MemoryClient, MemoryConnection, MemoryTransport, OutputProbe,
    Transport,
};
