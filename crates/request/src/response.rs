//! Building and sending the response to one request
//!
//! A [`Response`] collects a status code, headers, cookies and a body, then
//! [`send`](Response::send) serializes them onto the connection it shares with its
//! [`Request`](crate::Request) and finishes that connection:
//!
//! ```text
//! HTTP/1.1 200 OK
//! Server: <server name>              (only when configured)
//! <name>: <value>                    (each header, Content-Length excepted)
//! Set-Cookie: <name>=<value>         (each cookie)
//! Content-Length: <body length>
//!
//! <body>
//! ```

use std::collections::BTreeMap;
use std::ffi::CStr;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use bytes::{BufMut, BytesMut};
use http::StatusCode;
use tracing::{debug, error};

use crate::ByteBuffer;
use crate::connection::ConnectionHandle;
use crate::error::SendError;

const CRLF: &[u8] = b"\r\n";

/// How the first line of a response is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusLine {
    /// `HTTP/1.1 200 OK`
    #[default]
    Http11,
    /// `Status: 200 OK`, the CGI header most web servers translate for FastCGI responders
    Cgi,
}

/// Settings shared by every [`Response`] a listener produces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseConfig {
    server_name: Option<String>,
    status_line: StatusLine,
}

impl ResponseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `Server` header with this value to every response
    #[must_use]
    pub fn with_server_name<S: Into<String>>(mut self, server_name: S) -> Self {
        self.server_name = Some(server_name.into()).filter(|name| !name.is_empty());
        self
    }

    #[must_use]
    pub fn with_status_line(mut self, status_line: StatusLine) -> Self {
        self.status_line = status_line;
        self
    }

    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    pub fn status_line(&self) -> StatusLine {
        self.status_line
    }
}

/// The canonical reason phrase of `code`, `"Unknown"` when there is none
pub fn status_reason(code: u16) -> &'static str {
    StatusCode::from_u16(code).ok().and_then(|status| status.canonical_reason()).unwrap_or("Unknown")
}

/// The response to one request.
///
/// Starts as `200` with no headers, cookies or body. Consumed by [`send`](Self::send).
#[derive(Debug)]
pub struct Response {
    connection: ConnectionHandle,
    config: ResponseConfig,
    status_code: u16,
    headers: BTreeMap<String, String>,
    cookies: BTreeMap<String, String>,
    body: ByteBuffer,
}

impl Response {
    pub fn new(connection: ConnectionHandle, config: ResponseConfig) -> Self {
        Self {
            connection,
            config,
            status_code: 200,
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
            body: ByteBuffer::new(),
        }
    }

    pub fn set_status_code(&mut self, code: u16) {
        self.status_code = code;
    }

    pub fn status(&self) -> u16 {
        self.status_code
    }

    /// Sets a header, replacing an earlier value of the same name.
    ///
    /// `Content-Length` is always computed from the body; a value set here is not sent.
    pub fn set_header<K: Into<String>, V: Into<String>>(&mut self, name: K, value: V) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Sets a cookie, sent as `Set-Cookie: name=value`
    pub fn set_cookie<K: Into<String>, V: Into<String>>(&mut self, name: K, value: V) {
        self.cookies.insert(name.into(), value.into());
    }

    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    /// Replaces the body with the bytes of `s`
    pub fn set_string(&mut self, s: &str) {
        self.body = ByteBuffer::from(s);
    }

    /// Replaces the body with the bytes of `s` before its nul terminator
    pub fn set_c_string(&mut self, s: &CStr) {
        self.body = ByteBuffer::from_slice(s.to_bytes());
    }

    /// Replaces the body with a copy of `data`
    pub fn set_data(&mut self, data: &[u8]) {
        self.body = ByteBuffer::from_slice(data);
    }

    pub fn set_body(&mut self, body: ByteBuffer) {
        self.body = body;
    }

    pub fn body(&self) -> &ByteBuffer {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut ByteBuffer {
        &mut self.body
    }

    /// Replaces the body with the content of the file at `path`.
    ///
    /// On failure the error is logged and the body is left empty; the response can
    /// still be sent. Use [`try_read_local_file`](Self::try_read_local_file) to handle
    /// the error instead.
    pub fn read_local_file<P: AsRef<Path>>(&mut self, path: P) {
        let path = path.as_ref();
        if let Err(e) = self.try_read_local_file(path) {
            error!(path = %path.display(), cause = %e, "failed to read local file into response body");
            self.body.clear();
        }
    }

    /// Replaces the body with the content of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be opened or fully read; the body is
    /// then unchanged.
    pub fn try_read_local_file<P: AsRef<Path>>(&mut self, path: P) -> io::Result<()> {
        let mut file = File::open(path)?;
        let len = usize::try_from(file.metadata()?.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "file too large for memory"))?;

        let mut body = ByteBuffer::new();
        body.resize_to(len);
        file.read_exact(body.as_mut_bytes())?;
        self.body = body;
        Ok(())
    }

    /// Writes the status line, headers and body to the connection, then finishes it.
    ///
    /// # Errors
    ///
    /// Fails if the connection was already finished or a write fails. Nothing more
    /// is written after the first failure.
    pub fn send(self) -> Result<(), SendError> {
        let mut connection = self.connection.lock()?;
        if connection.is_finished() {
            return Err(SendError::AlreadyFinished);
        }

        let head = self.encode_head();
        connection.write_output(&head)?;
        if !self.body.is_empty() {
            connection.write_output(self.body.as_bytes())?;
        }
        connection.finish()?;

        debug!(status = self.status_code, body_len = self.body.len(), "response sent");
        Ok(())
    }

    fn encode_head(&self) -> BytesMut {
        let mut dst = BytesMut::with_capacity(128 + self.headers.len() * 32 + self.cookies.len() * 32);

        let reason = status_reason(self.status_code);
        let status = match self.config.status_line() {
            StatusLine::Http11 => format!("HTTP/1.1 {} {}", self.status_code, reason),
            StatusLine::Cgi => format!("Status: {} {}", self.status_code, reason),
        };
        put_line(&mut dst, &status);

        if let Some(server_name) = self.config.server_name() {
            put_field(&mut dst, "Server", server_name);
        }

        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            put_field(&mut dst, name, value);
        }

        for (name, value) in &self.cookies {
            dst.put_slice(b"Set-Cookie: ");
            dst.put_slice(name.as_bytes());
            dst.put_u8(b'=');
            put_line(&mut dst, value);
        }

        put_field(&mut dst, "Content-Length", &self.body.len().to_string());
        dst.put_slice(CRLF);
        dst
    }
}

fn put_field(dst: &mut BytesMut, name: &str, value: &str) {
    dst.put_slice(name.as_bytes());
    dst.put_slice(b": ");
    put_line(dst, value);
}

fn put_line(dst: &mut BytesMut, line: &str) {
    dst.put_slice(line.as_bytes());
    dst.put_slice(CRLF);
}
