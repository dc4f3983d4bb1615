use std::fs;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use micro_fcgi::{FcgiListener, ListenAddress, Transport};
use tracing::{debug, error, info, warn};

use super::config::ListenerConfig;
use super::queue::BlockingQueue;
use crate::connection::ConnectionHandle;
use crate::ensure;
use crate::error::ListenerError;
use crate::request::Request;
use crate::response::ResponseConfig;

const ACCEPT_THREAD_NAME: &str = "fcgi-listen";

/// Lifecycle of a [`Listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// No transport yet, or opening failed
    Invalid,
    /// A transport is bound; [`Listener::start`] may be called
    Attached,
    /// The accept thread is running
    Running,
    /// Stopped; [`Listener::open`] binds a fresh transport
    Stopped,
}

/// State shared with the accept thread
#[derive(Debug)]
struct Shared {
    queue: BlockingQueue<Request>,
    state: Mutex<ListenerState>,
    stop_requested: AtomicBool,
    error: Mutex<Option<String>>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ListenerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ListenerState) {
        *self.state() = state;
    }

    fn error(&self) -> MutexGuard<'_, Option<String>> {
        self.error.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Accepts FastCGI connections on a background thread and queues the parsed requests.
///
/// ```no_run
/// use micro_fcgi_request::Listener;
///
/// let listener = Listener::new("/tmp/app.sock");
/// listener.open()?;
/// listener.start()?;
/// loop {
///     let request = listener.next_request();
///     let mut response = request.response();
///     response.set_string("hello");
///     response.send()?;
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// Every method takes `&self`, so one listener can be shared, e.g. in an `Arc`,
/// between worker threads that all call [`next_request`](Self::next_request).
/// Dropping the listener stops it.
pub struct Listener {
    config: ListenerConfig,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shared: Arc<Shared>,
}

impl Listener {
    pub fn new<S: Into<String>>(path: S) -> Self {
        Self::with_config(ListenerConfig::new(path))
    }

    pub fn with_config(config: ListenerConfig) -> Self {
        Self {
            config,
            transport: Mutex::new(None),
            worker: Mutex::new(None),
            shared: Arc::new(Shared {
                queue: BlockingQueue::new(),
                state: Mutex::new(ListenerState::Invalid),
                stop_requested: AtomicBool::new(false),
                error: Mutex::new(None),
            }),
        }
    }

    /// Binds the configured path.
    ///
    /// A Unix socket path that another live process is serving is refused. A stale
    /// socket file left behind by a dead process is removed first.
    ///
    /// # Errors
    ///
    /// Fails on a blank path, a live socket at the path, or a failing bind. The state
    /// is then unchanged and [`error_string`](Self::error_string) describes the failure.
    pub fn open(&self) -> Result<(), ListenerError> {
        let result = self.try_open();
        self.record(&result);
        result
    }

    fn try_open(&self) -> Result<(), ListenerError> {
        let path = self.config.path();
        ensure!(!path.trim().is_empty(), ListenerError::BlankPath);
        ensure!(self.state() != ListenerState::Running, ListenerError::AlreadyRunning);

        let address = ListenAddress::parse(path).map_err(|e| ListenerError::io(path, "resolve", e))?;
        if let Some(socket_path) = address.unix_path() {
            remove_stale_socket(path, socket_path)?;
        }

        let listener =
            FcgiListener::bind(address, self.config.backlog()).map_err(|e| ListenerError::io(path, "bind", e))?;
        info!(path, "listener bound");
        self.attach_transport(Arc::new(listener));
        Ok(())
    }

    /// Uses `transport` instead of binding the configured path.
    ///
    /// # Errors
    ///
    /// Fails if the listener is running.
    pub fn attach<T: Transport + 'static>(&self, transport: T) -> Result<(), ListenerError> {
        let result = if self.state() == ListenerState::Running {
            Err(ListenerError::AlreadyRunning)
        } else {
            self.attach_transport(Arc::new(transport));
            Ok(())
        };
        self.record(&result);
        result
    }

    fn attach_transport(&self, transport: Arc<dyn Transport>) {
        *lock(&self.transport) = Some(transport);
        self.shared.set_state(ListenerState::Attached);
    }

    /// Spawns the accept thread.
    ///
    /// # Errors
    ///
    /// Fails if no transport is attached, the listener already runs, or the thread
    /// can't be spawned.
    pub fn start(&self) -> Result<(), ListenerError> {
        let result = self.try_start();
        self.record(&result);
        result
    }

    fn try_start(&self) -> Result<(), ListenerError> {
        let transport = lock(&self.transport).clone().ok_or(ListenerError::NotAttached)?;
        let mut state = self.shared.state();
        ensure!(*state != ListenerState::Running, ListenerError::AlreadyRunning);

        let mut worker = lock(&self.worker);
        if let Some(finished) = worker.take() {
            join(finished);
        }

        self.shared.stop_requested.store(false, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let response_config = self.config.response_config().clone();
        let handle = thread::Builder::new()
            .name(ACCEPT_THREAD_NAME.to_owned())
            .spawn(move || accept_loop(transport.as_ref(), &shared, &response_config))
            .map_err(|source| ListenerError::Spawn { source })?;

        *worker = Some(handle);
        *state = ListenerState::Running;
        info!(path = self.config.path(), "listener started");
        Ok(())
    }

    /// Stops accepting, waits for the accept thread and releases the transport.
    ///
    /// A request being parsed when stop is called is still queued. Requests already
    /// queued stay available to [`next_request`](Self::next_request). Calling stop
    /// again, or before start, does nothing.
    pub fn stop(&self) {
        self.shared.stop_requested.store(true, Ordering::Release);

        let transport = lock(&self.transport).take();
        if let Some(transport) = &transport
            && let Err(e) = transport.shutdown()
        {
            warn!(cause = %e, "failed to shut down transport");
        }

        if let Some(worker) = lock(&self.worker).take() {
            join(worker);
        }
        drop(transport);

        let mut state = self.shared.state();
        if *state != ListenerState::Invalid {
            if *state != ListenerState::Stopped {
                info!(path = self.config.path(), "listener stopped");
            }
            *state = ListenerState::Stopped;
        }
    }

    /// Takes the oldest queued request, waiting for one if the queue is empty.
    ///
    /// Each request is handed to exactly one caller. Once the listener has stopped
    /// and its queue is drained this waits forever; use
    /// [`next_request_timeout`](Self::next_request_timeout) where that matters.
    pub fn next_request(&self) -> Request {
        self.shared.queue.pop()
    }

    pub fn try_next_request(&self) -> Option<Request> {
        self.shared.queue.try_pop()
    }

    pub fn next_request_timeout(&self, timeout: Duration) -> Option<Request> {
        self.shared.queue.pop_timeout(timeout)
    }

    /// Number of parsed requests waiting in the queue
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn state(&self) -> ListenerState {
        *self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ListenerState::Running
    }

    /// The last error, empty if the last lifecycle call succeeded
    pub fn error_string(&self) -> String {
        self.shared.error().clone().unwrap_or_default()
    }

    pub fn has_error(&self) -> bool {
        self.shared.error().is_some()
    }

    pub fn listener_path(&self) -> &str {
        self.config.path()
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    fn record(&self, result: &Result<(), ListenerError>) {
        let mut error = self.shared.error();
        match result {
            Ok(()) => *error = None,
            Err(e) => {
                error!(path = self.config.path(), cause = %e, "listener error");
                *error = Some(e.to_string());
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

fn accept_loop(transport: &dyn Transport, shared: &Shared, response_config: &ResponseConfig) {
    debug!("accept loop started");
    loop {
        let connection = match transport.accept() {
            Ok(connection) => connection,
            Err(e) => {
                if !shared.stop_requested.load(Ordering::Acquire) {
                    error!(cause = %e, "accept failed, listener stops");
                    *shared.error() = Some(e.to_string());
                }
                break;
            }
        };

        if shared.stop_requested.load(Ordering::Acquire) {
            debug!("dropping connection accepted while stopping");
            break;
        }

        let mut request = Request::new(ConnectionHandle::new(connection)).with_response_config(response_config.clone());
        match request.parse() {
            Ok(()) => shared.queue.push(request),
            Err(e) => warn!(cause = %e, "dropping request that failed to parse"),
        }
    }

    shared.set_state(ListenerState::Stopped);
    debug!("accept loop finished");
}

/// Removes whatever is left at `socket_path` unless a live server still answers on it
fn remove_stale_socket(path: &str, socket_path: &Path) -> Result<(), ListenerError> {
    let metadata = match fs::symlink_metadata(socket_path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(ListenerError::io(path, "stat", e)),
    };

    if metadata.file_type().is_socket() && UnixStream::connect(socket_path).is_ok() {
        return Err(ListenerError::address_in_use(path));
    }

    debug!(path, "removing stale socket file");
    fs::remove_file(socket_path).map_err(|e| ListenerError::io(path, "unlink", e))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn join(worker: JoinHandle<()>) {
    if worker.join().is_err() {
        error!("accept thread panicked");
    }
}
