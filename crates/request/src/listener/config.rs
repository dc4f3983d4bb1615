use std::env;

use tracing::warn;

use crate::response::ResponseConfig;

/// Default `listen(2)` backlog
pub const DEFAULT_BACKLOG: i32 = 128;

pub const ENV_LISTEN_PATH: &str = "FCGI_LISTEN_PATH";
pub const ENV_LISTEN_BACKLOG: &str = "FCGI_LISTEN_BACKLOG";
pub const ENV_SERVER_NAME: &str = "FCGI_SERVER_NAME";

/// Where and how a [`Listener`](super::Listener) listens.
///
/// `path` is a Unix socket path, or `host:port` / `:port` for TCP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    path: String,
    backlog: i32,
    response: ResponseConfig,
}

impl ListenerConfig {
    pub fn new<S: Into<String>>(path: S) -> Self {
        Self { path: path.into(), backlog: DEFAULT_BACKLOG, response: ResponseConfig::default() }
    }

    /// Reads `FCGI_LISTEN_PATH`, `FCGI_LISTEN_BACKLOG` and `FCGI_SERVER_NAME`.
    ///
    /// A missing path leaves it blank, which [`Listener::open`](super::Listener::open)
    /// rejects; an unparsable backlog falls back to the default.
    pub fn from_env() -> Self {
        let mut config = Self::new(env::var(ENV_LISTEN_PATH).unwrap_or_default());

        if let Ok(backlog) = env::var(ENV_LISTEN_BACKLOG) {
            match backlog.trim().parse::<i32>() {
                Ok(backlog) if backlog > 0 => config.backlog = backlog,
                _ => warn!(backlog = %backlog, "ignoring invalid {ENV_LISTEN_BACKLOG}"),
            }
        }

        if let Ok(server_name) = env::var(ENV_SERVER_NAME) {
            config.response = config.response.with_server_name(server_name);
        }
        config
    }

    #[must_use]
    pub fn with_backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog.max(1);
        self
    }

    #[must_use]
    pub fn with_response_config(mut self, response: ResponseConfig) -> Self {
        self.response = response;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn backlog(&self) -> i32 {
        self.backlog
    }

    pub fn response_config(&self) -> &ResponseConfig {
        &self.response
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self::new("")
    }
}
