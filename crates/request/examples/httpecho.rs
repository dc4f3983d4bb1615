//! Echoes every request back as plain text.
//!
//! ```text
//! FCGI_LISTEN_PATH=/tmp/httpecho.sock cargo run --example httpecho
//! ```
//!
//! Point a web server at the socket, e.g. nginx with `fastcgi_pass unix:/tmp/httpecho.sock;`.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use micro_fcgi_request::{Listener, ListenerConfig, Request, ResponseConfig, StatusLine};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

const WORKERS: usize = 4;
const DEFAULT_PATH: &str = "/tmp/httpecho.sock";
const POLL_INTERVAL: Duration = Duration::from_millis(500);

fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut config = ListenerConfig::from_env();
    if config.path().is_empty() {
        config = ListenerConfig::new(DEFAULT_PATH);
    }
    let server_name = config.response_config().server_name().unwrap_or("httpecho").to_owned();
    let config = config
        .with_response_config(ResponseConfig::new().with_server_name(server_name).with_status_line(StatusLine::Cgi));

    let listener = Arc::new(Listener::with_config(config));
    if let Err(e) = listener.open().and_then(|()| listener.start()) {
        error!(cause = %e, "failed to start listener");
        return;
    }
    info!(path = listener.listener_path(), workers = WORKERS, "httpecho listening");

    let workers: Vec<_> = (0..WORKERS)
        .map(|id| {
            let listener = Arc::clone(&listener);
            thread::Builder::new()
                .name(format!("httpecho-{id}"))
                .spawn(move || {
                    while listener.is_running() {
                        if let Some(request) = listener.next_request_timeout(POLL_INTERVAL) {
                            echo(&request);
                        }
                    }
                })
                .expect("failed to spawn worker")
        })
        .collect();

    for worker in workers {
        if worker.join().is_err() {
            error!("worker panicked");
        }
    }
}

fn echo(request: &Request) {
    let mut body = request.debug_dump();
    for (name, item) in request.files() {
        body.push_str(&format!("file {name}: {} bytes\n", item.data().len()));
    }

    let mut response = request.response();
    response.set_header("Content-Type", "text/plain; charset=utf-8");
    response.set_cookie("httpecho", "1");
    response.set_string(&body);
    if let Err(e) = response.send() {
        warn!(cause = %e, uri = request.uri(), "failed to send response");
    }
}
