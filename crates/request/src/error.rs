use std::io;
use thiserror::Error;

/// Errors of [`Listener`](crate::Listener) configuration and lifecycle calls.
///
/// The `Display` form is what [`Listener::error_string`](crate::Listener::error_string) reports.
#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Blank listener path")]
    BlankPath,

    #[error("{path}: address already in use")]
    AddressInUse { path: String },

    #[error("{path} ({operation}): {source}")]
    Io {
        path: String,
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Invalid listener (call open() first)")]
    NotAttached,

    #[error("Listener already running")]
    AlreadyRunning,

    #[error("failed to spawn the accept thread: {source}")]
    Spawn {
        #[source]
        source: io::Error,
    },
}

impl ListenerError {
    pub fn address_in_use<S: ToString>(path: S) -> Self {
        Self::AddressInUse { path: path.to_string() }
    }

    pub fn io<S: ToString>(path: S, operation: &'static str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::AddrInUse {
            return Self::address_in_use(path);
        }
        Self::Io { path: path.to_string(), operation, source }
    }
}

/// A panic while a thread held the connection lock left it in an unknown state
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("connection poisoned by a panicking thread")]
pub struct PoisonedConnection;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("failed to read request body: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error(transparent)]
    Poisoned(#[from] PoisonedConnection),
}

impl ParseError {
    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("response already sent, the connection is finished")]
    AlreadyFinished,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error(transparent)]
    Poisoned(#[from] PoisonedConnection),
}

impl SendError {
    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
