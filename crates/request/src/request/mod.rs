//! The parsed view of one FastCGI request
//!
//! A [`Request`] is created around a connection, filled in by
//! [`parse`](Request::parse), and answered through the [`Response`] returned by
//! [`response`](Request::response).

mod parser;

use std::collections::BTreeMap;
use std::fmt;

use micro_fcgi::Connection;

use crate::connection::ConnectionHandle;
use crate::multipart::MultipartItem;
use crate::response::{Response, ResponseConfig};
use crate::ByteBuffer;

/// Environment keys carrying HTTP request headers start with this prefix
pub const HEADER_PREFIX: &str = "HTTP_";

/// One request: its CGI environment, headers, cookies, form fields, uploaded files
/// and raw body.
///
/// Every map keeps the last value when a key repeats. Lookups of missing keys
/// return the empty string.
#[derive(Debug)]
pub struct Request {
    connection: ConnectionHandle,
    response_config: ResponseConfig,
    environment: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
    cookies: BTreeMap<String, String>,
    query_fields: BTreeMap<String, String>,
    post_fields: BTreeMap<String, String>,
    files: BTreeMap<String, MultipartItem>,
    post_data: ByteBuffer,
    body_read: bool,
    uri: String,
    query_string: String,
    method: String,
}

impl Request {
    pub fn new(connection: ConnectionHandle) -> Self {
        Self {
            connection,
            response_config: ResponseConfig::default(),
            environment: BTreeMap::new(),
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
            query_fields: BTreeMap::new(),
            post_fields: BTreeMap::new(),
            files: BTreeMap::new(),
            post_data: ByteBuffer::new(),
            body_read: false,
            uri: String::new(),
            query_string: String::new(),
            method: String::new(),
        }
    }

    pub fn from_connection<C: Connection + 'static>(connection: C) -> Self {
        Self::new(ConnectionHandle::from_connection(connection))
    }

    /// Sets the configuration handed to the [`Response`] of this request
    #[must_use]
    pub fn with_response_config(mut self, config: ResponseConfig) -> Self {
        self.response_config = config;
        self
    }

    /// A response bound to the same connection
    pub fn response(&self) -> Response {
        Response::new(self.connection.clone(), self.response_config.clone())
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    /// `SCRIPT_NAME` of the request
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// `QUERY_STRING` of the request, undecoded
    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    /// `REQUEST_METHOD` of the request
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn has_env(&self, key: &str) -> bool {
        self.environment.contains_key(key)
    }

    /// A CGI environment variable
    pub fn env(&self, key: &str) -> &str {
        lookup(&self.environment, key)
    }

    /// An HTTP request header.
    ///
    /// Headers are stored the way the web server passes them, upper case with `_`
    /// separators and without the `HTTP_` prefix, so `"CONTENT_TYPE"`, `"Content-Type"`
    /// and `"HTTP_CONTENT_TYPE"` all find the same header.
    pub fn header(&self, key: &str) -> &str {
        self.find_header(key).unwrap_or_default()
    }

    pub fn has_header(&self, key: &str) -> bool {
        self.find_header(key).is_some()
    }

    fn find_header(&self, key: &str) -> Option<&str> {
        if let Some(value) = self.headers.get(key) {
            return Some(value);
        }
        let normalized = key.to_ascii_uppercase().replace('-', "_");
        let normalized = normalized.strip_prefix(HEADER_PREFIX).unwrap_or(&normalized);
        self.headers.get(normalized).map(String::as_str)
    }

    pub fn has_cookie(&self, key: &str) -> bool {
        self.cookies.contains_key(key)
    }

    pub fn cookie(&self, key: &str) -> &str {
        lookup(&self.cookies, key)
    }

    pub fn has_query_field(&self, key: &str) -> bool {
        self.query_fields.contains_key(key)
    }

    /// A decoded field of the query string
    pub fn query_field(&self, key: &str) -> &str {
        lookup(&self.query_fields, key)
    }

    pub fn has_post_field(&self, key: &str) -> bool {
        self.post_fields.contains_key(key)
    }

    /// A form field from a url-encoded body or a non-file multipart item
    pub fn post_field(&self, key: &str) -> &str {
        lookup(&self.post_fields, key)
    }

    pub fn has_file(&self, key: &str) -> bool {
        self.files.contains_key(key)
    }

    /// A multipart item uploaded with a `filename`
    pub fn file(&self, key: &str) -> Option<&MultipartItem> {
        self.files.get(key)
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    pub fn query_fields(&self) -> &BTreeMap<String, String> {
        &self.query_fields
    }

    pub fn post_fields(&self) -> &BTreeMap<String, String> {
        &self.post_fields
    }

    pub fn files(&self) -> &BTreeMap<String, MultipartItem> {
        &self.files
    }

    /// The raw request body
    pub fn post_data(&self) -> &ByteBuffer {
        &self.post_data
    }

    /// A human-readable listing of the request: method, uri, query string, every map,
    /// then the body with non-printable bytes escaped.
    pub fn debug_dump(&self) -> String {
        Dump(self).to_string()
    }
}

struct Dump<'a>(&'a Request);

impl fmt::Display for Dump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let request = self.0;
        writeln!(f, "method: {}", request.method)?;
        writeln!(f, "uri: {}", request.uri)?;
        writeln!(f, "query string: {}", request.query_string)?;

        dump_section(f, "environment", &request.environment)?;
        dump_section(f, "headers", &request.headers)?;
        dump_section(f, "cookies", &request.cookies)?;
        dump_section(f, "query fields", &request.query_fields)?;
        dump_section(f, "post fields", &request.post_fields)?;

        writeln!(f, "files:")?;
        for (name, item) in &request.files {
            writeln!(
                f,
                "  {name}: filename={} content-type={} size={}",
                item.filename().unwrap_or_default(),
                item.content_type().unwrap_or_default(),
                item.data().len()
            )?;
        }
        writeln!(f, "post data: {} bytes", request.post_data.len())?;
        if !request.post_data.is_empty() {
            writeln!(f, "  {}", request.post_data.escape_ascii())?;
        }
        Ok(())
    }
}

fn lookup<'a>(map: &'a BTreeMap<String, String>, key: &str) -> &'a str {
    map.get(key).map(String::as_str).unwrap_or_default()
}

fn dump_section(f: &mut fmt::Formatter<'_>, title: &str, map: &BTreeMap<String, String>) -> fmt::Result {
    writeln!(f, "{title}:")?;
    for (key, value) in map {
        writeln!(f, "  {key} = {value}")?;
    }
    Ok(())
}
