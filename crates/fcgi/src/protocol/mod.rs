//! FastCGI 1.0 protocol types.
//!
//! - [`Record`] and [`RecordType`]: the framing unit of every FastCGI exchange
//! - [`BeginRequestBody`] / [`EndRequestBody`]: fixed-size record bodies
//! - [`params`]: the name-value pair format carried by PARAMS and GET_VALUES records
//! - [`ProtocolError`]: everything that can go wrong while speaking the protocol

mod record;
pub use record::BeginRequestBody;
pub use record::EndRequestBody;
pub use record::ProtocolStatus;
pub use record::Record;
pub use record::RecordType;
pub use record::Role;
pub use record::{FCGI_KEEP_CONN, FCGI_VERSION_1, HEADER_LEN, MAX_CONTENT_LEN, NULL_REQUEST_ID};

mod error;
pub use error::ProtocolError;

pub mod params;
