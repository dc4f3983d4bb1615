use std::io;
use thiserror::Error;

use crate::protocol::RecordType;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("invalid fastcgi version: {0}")]
    InvalidVersion(u8),

    #[error("unexpected {record_type:?} record for request {request_id}")]
    UnexpectedRecord { record_type: RecordType, request_id: u16 },

    #[error("invalid begin request body: {reason}")]
    InvalidBeginRequest { reason: String },

    #[error("unsupported role {0}")]
    UnsupportedRole(u16),

    #[error("malformed name-value pairs: {reason}")]
    MalformedParams { reason: String },

    #[error("request {0} aborted by the web server")]
    Aborted(u16),

    #[error("connection closed before the request was complete")]
    UnexpectedEof,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ProtocolError {
    pub fn unexpected_record(record_type: RecordType, request_id: u16) -> Self {
        Self::UnexpectedRecord { record_type, request_id }
    }

    pub fn invalid_begin_request<S: ToString>(str: S) -> Self {
        Self::InvalidBeginRequest { reason: str.to_string() }
    }

    pub fn malformed_params<S: ToString>(str: S) -> Self {
        Self::MalformedParams { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

impl From<ProtocolError> for io::Error {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::Io { source } => source,
            ProtocolError::UnexpectedEof => io::Error::new(io::ErrorKind::UnexpectedEof, e),
            e => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}
