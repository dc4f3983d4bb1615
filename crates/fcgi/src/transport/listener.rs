use std::fmt;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use socket2::{Domain, SockAddr, Socket, Type};
use tracing::{debug, info, warn};

use crate::transport::{Connection, FcgiConnection, Stream, Transport};

/// Where a [`FcgiListener`] listens.
///
/// Follows the libfcgi convention: `host:port` or `:port` is a TCP address,
/// anything else is the path of a Unix domain socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddress {
    Unix(PathBuf),
    Tcp(SocketAddr),
}

impl ListenAddress {
    /// # Errors
    ///
    /// Returns an error if a TCP style address can't be resolved.
    pub fn parse(path: &str) -> io::Result<Self> {
        let tcp = path.rsplit_once(':').filter(|_| !path.contains('/'));
        let Some((host, Ok(port))) = tcp.map(|(host, port)| (host, port.parse::<u16>())) else {
            return Ok(ListenAddress::Unix(PathBuf::from(path)));
        };

        let host = if host.is_empty() { "0.0.0.0" } else { host };
        let address = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, format!("{path} did not resolve")))?;
        Ok(ListenAddress::Tcp(address))
    }

    pub fn unix_path(&self) -> Option<&Path> {
        match self {
            ListenAddress::Unix(path) => Some(path),
            ListenAddress::Tcp(_) => None,
        }
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenAddress::Unix(path) => write!(f, "{}", path.display()),
            ListenAddress::Tcp(address) => write!(f, "{address}"),
        }
    }
}

/// A listening FastCGI socket.
///
/// [`accept`](Transport::accept) blocks for the next connection and reads its request
/// head; connections that break the protocol are logged and dropped without
/// surfacing as accept errors. [`shutdown`](Transport::shutdown) unblocks a pending
/// accept from another thread, including one waiting for a peer to send its request
/// head, and ends the body of the last accepted request.
#[derive(Debug)]
pub struct FcgiListener {
    socket: Socket,
    address: ListenAddress,
    closed: AtomicBool,
    // the most recently accepted stream, shut for reading on shutdown
    last_accepted: Mutex<Option<Stream>>,
}

impl FcgiListener {
    /// Binds and listens on `address`.
    ///
    /// # Errors
    ///
    /// Returns the error of the failing `socket`, `bind` or `listen` call.
    pub fn bind(address: ListenAddress, backlog: i32) -> io::Result<Self> {
        let socket = match &address {
            ListenAddress::Unix(path) => {
                let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
                socket.bind(&SockAddr::unix(path)?)?;
                socket
            }
            ListenAddress::Tcp(addr) => {
                let socket = Socket::new(Domain::for_address(*addr), Type::STREAM, None)?;
                socket.set_reuse_address(true)?;
                socket.bind(&(*addr).into())?;
                socket
            }
        };
        socket.listen(backlog)?;

        info!(address = %address, backlog, "fastcgi listener bound");
        Ok(Self { socket, address, closed: AtomicBool::new(false), last_accepted: Mutex::new(None) })
    }

    pub fn address(&self) -> &ListenAddress {
        &self.address
    }

    /// The bound TCP address, useful after binding port `0`
    pub fn local_tcp_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok().and_then(|addr| addr.as_socket())
    }

    /// Accepts the next well-formed FastCGI request.
    ///
    /// # Errors
    ///
    /// Returns an error when the socket fails or the listener has been shut down.
    pub fn accept_connection(&self) -> io::Result<FcgiConnection> {
        loop {
            let accepted = self.socket.accept();
            if self.closed.load(Ordering::Acquire) {
                return Err(shut_down());
            }

            let socket = match accepted {
                Ok((socket, _)) => socket,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };

            let stream = match self.address {
                ListenAddress::Unix(_) => Stream::Unix(UnixStream::from(socket)),
                ListenAddress::Tcp(_) => Stream::Tcp(TcpStream::from(socket)),
            };
            match stream.try_clone() {
                Ok(tracked) => *self.last_accepted() = Some(tracked),
                Err(e) => {
                    warn!(cause = %e, "dropping connection that can't be tracked");
                    continue;
                }
            }
            if self.closed.load(Ordering::Acquire) {
                return Err(shut_down());
            }

            match FcgiConnection::establish(stream) {
                Ok(connection) => return Ok(connection),
                Err(_) if self.closed.load(Ordering::Acquire) => return Err(shut_down()),
                Err(e) => warn!(cause = %e, "dropping malformed fastcgi connection"),
            }
        }
    }

    fn last_accepted(&self) -> MutexGuard<'_, Option<Stream>> {
        self.last_accepted.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connects to ourselves so that a blocked `accept` returns and sees the closed flag.
    fn wake(&self) {
        let result = match &self.address {
            ListenAddress::Unix(path) => UnixStream::connect(path).map(drop),
            ListenAddress::Tcp(_) => match self.local_tcp_addr() {
                Some(addr) => TcpStream::connect(addr).map(drop),
                None => Ok(()),
            },
        };
        if let Err(e) = result {
            debug!(cause = %e, "wake connection not established");
        }
    }
}

impl Transport for FcgiListener {
    fn accept(&self) -> io::Result<Box<dyn Connection>> {
        self.accept_connection().map(|connection| Box::new(connection) as Box<dyn Connection>)
    }

    fn shutdown(&self) -> io::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let result = self.socket.shutdown(Shutdown::Both);
        // shutdown(2) on a listening socket is not guaranteed to interrupt accept(2) everywhere
        self.wake();
        // a peer that connected but never finishes its request must not hold the accept thread
        if let Some(stream) = self.last_accepted().take()
            && let Err(e) = stream.shutdown(Shutdown::Read)
        {
            debug!(cause = %e, "last accepted stream already closed");
        }
        info!(address = %self.address, "fastcgi listener shut down");
        match result {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
            _ => Ok(()),
        }
    }
}

fn shut_down() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "listener shut down")
}

impl Drop for FcgiListener {
    fn drop(&mut self) {
        if let Some(path) = self.address.unix_path() {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "removed socket file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), cause = %e, "failed to remove socket file"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RecordCodec;
    use crate::protocol::{Record, RecordType, Role};
    use bytes::BytesMut;
    use std::io::Write;
    use std::sync::{Arc, mpsc};
    use std::thread;
    use std::time::Duration;
    use tokio_util::codec::Encoder;

    #[test]
    fn parse_addresses() {
        assert_eq!(ListenAddress::parse("/tmp/app.sock").unwrap(), ListenAddress::Unix(PathBuf::from("/tmp/app.sock")));
        assert_eq!(ListenAddress::parse("app.sock").unwrap(), ListenAddress::Unix(PathBuf::from("app.sock")));
        assert_eq!(ListenAddress::parse("127.0.0.1:9000").unwrap(), ListenAddress::Tcp("127.0.0.1:9000".parse().unwrap()));
        assert_eq!(ListenAddress::parse(":9000").unwrap(), ListenAddress::Tcp("0.0.0.0:9000".parse().unwrap()));
        assert_eq!(ListenAddress::parse("/run/a:b").unwrap(), ListenAddress::Unix(PathBuf::from("/run/a:b")));
    }

    #[test]
    fn accept_over_unix_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fcgi.sock");
        let listener = FcgiListener::bind(ListenAddress::Unix(path.clone()), 8).unwrap();

        let client = thread::spawn(move || {
            let mut stream = UnixStream::connect(&path).unwrap();
            let mut buf = BytesMut::new();
            RecordCodec.encode(Record::begin_request(1, Role::Responder, 0), &mut buf).unwrap();
            RecordCodec.encode(Record::end_of_stream(RecordType::Params, 1), &mut buf).unwrap();
            stream.write_all(&buf).unwrap();
            stream
        });

        let mut connection = listener.accept().unwrap();
        assert!(connection.environment().is_empty());
        connection.finish().unwrap();
        drop(client.join().unwrap());
    }

    #[test]
    fn shutdown_unblocks_accept() {
        let dir = tempfile::tempdir().unwrap();
        let listener = Arc::new(FcgiListener::bind(ListenAddress::Unix(dir.path().join("fcgi.sock")), 8).unwrap());

        let acceptor = {
            let listener = Arc::clone(&listener);
            thread::spawn(move || listener.accept().map(|_| ()))
        };

        thread::sleep(Duration::from_millis(50));
        listener.shutdown().unwrap();
        assert!(acceptor.join().unwrap().is_err());

        // a second shutdown is a no-op
        listener.shutdown().unwrap();
    }

    #[test]
    fn shutdown_unblocks_accept_waiting_for_request_head() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fcgi.sock");
        let listener = Arc::new(FcgiListener::bind(ListenAddress::Unix(path.clone()), 8).unwrap());

        let (done_tx, done_rx) = mpsc::channel();
        let acceptor = {
            let listener = Arc::clone(&listener);
            thread::spawn(move || {
                let result = listener.accept().map(|_| ());
                done_tx.send(()).unwrap();
                result
            })
        };

        // connected, but never sends BEGIN_REQUEST
        let idle = UnixStream::connect(&path).unwrap();
        thread::sleep(Duration::from_millis(50));
        listener.shutdown().unwrap();

        done_rx.recv_timeout(Duration::from_secs(5)).expect("accept still blocked after shutdown");
        assert!(acceptor.join().unwrap().is_err());
        drop(idle);
    }

    #[test]
    fn socket_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fcgi.sock");
        let listener = FcgiListener::bind(ListenAddress::Unix(path.clone()), 8).unwrap();
        assert!(path.exists());
        drop(listener);
        assert!(!path.exists());
    }
}
