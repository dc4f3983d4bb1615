//! Accepting connections and queueing parsed requests
//!
//! A [`Listener`] owns one transport. After [`open`](Listener::open) (or
//! [`attach`](Listener::attach)) and [`start`](Listener::start), a background thread
//! accepts connections, parses each into a [`Request`](crate::Request) and pushes it
//! onto a FIFO queue that any number of threads drain with
//! [`next_request`](Listener::next_request).

mod config;
mod lifecycle;
mod queue;

pub use config::{DEFAULT_BACKLOG, ENV_LISTEN_BACKLOG, ENV_LISTEN_PATH, ENV_SERVER_NAME, ListenerConfig};
pub use lifecycle::{Listener, ListenerState};
