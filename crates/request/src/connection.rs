use std::fmt;
use std::sync::{Mutex, MutexGuard};

use micro_fcgi::Connection;
use triomphe::Arc;

use crate::error::PoisonedConnection;

/// A reference counted handle to one transport connection.
///
/// A [`Request`](crate::Request) and the [`Response`](crate::Response) created from it
/// share the same handle; the connection is released when the last clone is dropped.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<Mutex<Box<dyn Connection>>>,
}

impl ConnectionHandle {
    pub fn new(connection: Box<dyn Connection>) -> Self {
        Self { inner: Arc::new(Mutex::new(connection)) }
    }

    pub fn from_connection<C: Connection + 'static>(connection: C) -> Self {
        Self::new(Box::new(connection))
    }

    /// Locks the connection for reading or writing.
    ///
    /// # Errors
    ///
    /// Returns [`PoisonedConnection`] if a thread panicked while holding the lock.
    pub fn lock(&self) -> Result<MutexGuard<'_, Box<dyn Connection>>, PoisonedConnection> {
        self.inner.lock().map_err(|_poisoned| PoisonedConnection)
    }

    /// Whether this is the last handle to the connection
    pub fn is_unique(&self) -> bool {
        self.inner.is_unique()
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `None` while the connection is locked, possibly by the formatting thread
        let finished = self.inner.try_lock().map(|connection| connection.is_finished()).ok();
        f.debug_struct("ConnectionHandle").field("finished", &finished).field("unique", &self.is_unique()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use micro_fcgi::MemoryConnection;

    #[test]
    fn shared_between_clones() {
        let (connection, probe) = MemoryConnection::new(["A=1"], bytes::Bytes::new());
        let handle = ConnectionHandle::from_connection(connection);
        assert!(handle.is_unique());

        let other = handle.clone();
        assert!(!handle.is_unique());

        other.lock().unwrap().write_output(b"x").unwrap();
        drop(other);
        assert!(handle.is_unique());

        handle.lock().unwrap().finish().unwrap();
        assert_eq!(probe.output(), b"x");
        assert!(probe.is_finished());
    }

    #[test]
    fn debug_while_locked() {
        let (connection, _probe) = MemoryConnection::new(["A=1"], bytes::Bytes::new());
        let handle = ConnectionHandle::from_connection(connection);
        assert_eq!(format!("{handle:?}"), "ConnectionHandle { finished: Some(false), unique: true }");

        let guard = handle.lock().unwrap();
        assert_eq!(format!("{handle:?}"), "ConnectionHandle { finished: None, unique: true }");
        drop(guard);
    }
}
