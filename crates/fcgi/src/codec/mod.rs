//! FastCGI record codec
//!
//! [`RecordCodec`] turns a byte stream into [`Record`](crate::protocol::Record)s and back.
//! It implements the `tokio_util` codec traits, so the same framing can back a
//! blocking socket loop (as [`transport`](crate::transport) does) or a `Framed` stream.

mod record_codec;

pub use record_codec::RecordCodec;
pub use record_codec::encode_stream;
