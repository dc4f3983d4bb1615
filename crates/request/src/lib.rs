//! Parsed FastCGI requests on a blocking queue
//!
//! This crate turns FastCGI connections accepted by [`micro_fcgi`] into parsed
//! [`Request`]s: CGI environment, HTTP headers, cookies, query and form fields,
//! `multipart/form-data` uploads and the raw body. A [`Listener`] accepts and parses
//! on a background thread; worker threads take requests off its queue and answer
//! each with a [`Response`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::thread;
//! use std::time::Duration;
//!
//! use micro_fcgi_request::Listener;
//!
//! let listener = Arc::new(Listener::new("/tmp/app.sock"));
//! listener.open()?;
//! listener.start()?;
//!
//! let workers: Vec<_> = (0..4)
//!     .map(|_| {
//!         let listener = Arc::clone(&listener);
//!         thread::spawn(move || {
//!             while listener.is_running() {
//!                 let Some(request) = listener.next_request_timeout(Duration::from_millis(500)) else {
//!                     continue;
//!                 };
//!                 let mut response = request.response();
//!                 response.set_header("Content-Type", "text/plain");
//!                 response.set_string(&format!("hello {}", request.query_field("name")));
//!                 if let Err(e) = response.send() {
//!                     eprintln!("send failed: {e}");
//!                 }
//!             }
//!         })
//!     })
//!     .collect();
//! # drop(workers);
//! # Ok::<(), micro_fcgi_request::ListenerError>(())
//! ```
//!
//! # Architecture
//!
//! - [`buffer`]: [`ByteBuffer`], the binary-safe byte container
//! - [`codec`]: url, base64, query string and cookie helpers
//! - [`multipart`]: `multipart/form-data` parsing
//! - [`request`]: [`Request`] and its parser
//! - [`response`]: [`Response`] serialization
//! - [`listener`]: [`Listener`], its accept thread and request queue

pub mod buffer;
pub mod codec;
pub mod connection;
pub mod error;
pub mod listener;
pub mod multipart;
pub mod request;
pub mod response;

mod utils;
pub(crate) use utils::ensure;

pub use buffer::{ByteBuffer, OUT_OF_RANGE};
pub use connection::ConnectionHandle;
pub use error::{ListenerError, ParseError, PoisonedConnection, SendError};
pub use listener::{Listener, ListenerConfig, ListenerState};
pub use multipart::MultipartItem;
pub use request::Request;
pub use response::{Response, ResponseConfig, StatusLine};
