use std::collections::BTreeMap;
use std::io;

use tracing::{debug, trace, warn};

use super::{HEADER_PREFIX, Request};
use crate::ByteBuffer;
use crate::codec::{cookie_parse, query_string_parse};
use crate::error::ParseError;
use crate::multipart::{extract_boundary, parse_multipart};

const READ_CHUNK: usize = 8 * 1024;
const INITIAL_BODY_CAPACITY: usize = 64 * 1024;

impl Request {
    /// Fills in the request from its connection.
    ///
    /// Splits the environment into variables and headers, reads `CONTENT_LENGTH`
    /// bytes of body, then decodes the query string, cookies and the body as
    /// multipart or url-encoded form data. A body shorter than announced is kept
    /// as received. Parsing again rebuilds every map from the same body.
    ///
    /// # Errors
    ///
    /// Fails if reading the body fails; the request should then be dropped.
    pub fn parse(&mut self) -> Result<(), ParseError> {
        let entries = self.connection.lock()?.environment().to_vec();
        self.clear_fields();

        for entry in &entries {
            let Some((key, value)) = entry.split_once('=') else {
                trace!(entry, "skipping environment entry without '='");
                continue;
            };
            if let Some(header) = key.strip_prefix(HEADER_PREFIX) {
                self.headers.insert(header.to_owned(), value.to_owned());
            }
            self.environment.insert(key.to_owned(), value.to_owned());
        }

        self.uri = self.env("SCRIPT_NAME").to_owned();
        self.query_string = self.env("QUERY_STRING").to_owned();
        self.method = self.env("REQUEST_METHOD").to_owned();

        if !self.body_read {
            let content_length = self.env("CONTENT_LENGTH").trim().parse::<usize>().unwrap_or(0);
            self.read_body(content_length)?;
            self.body_read = true;
        }

        self.query_fields = query_string_parse(&self.query_string);

        let cookie = self.header("COOKIE");
        if !cookie.is_empty() {
            self.cookies = cookie_parse(cookie);
        }

        if !self.post_data.is_empty() {
            self.parse_body();
        }

        debug!(method = %self.method, uri = %self.uri, body_len = self.post_data.len(), "request parsed");
        Ok(())
    }

    fn clear_fields(&mut self) {
        self.environment.clear();
        self.headers.clear();
        self.cookies.clear();
        self.query_fields.clear();
        self.post_fields.clear();
        self.files.clear();
    }

    fn read_body(&mut self, content_length: usize) -> Result<(), ParseError> {
        let mut body = ByteBuffer::with_capacity(content_length.min(INITIAL_BODY_CAPACITY));
        let mut chunk = [0u8; READ_CHUNK];
        {
            let mut connection = self.connection.lock()?;
            while body.len() < content_length {
                let want = (content_length - body.len()).min(READ_CHUNK);
                match connection.read_input(&mut chunk[..want]) {
                    Ok(0) => break,
                    Ok(n) => {
                        body.append_slice(&chunk[..n]);
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                    Err(e) => return Err(ParseError::io(e)),
                }
            }
        }

        if body.len() < content_length {
            warn!(expected = content_length, received = body.len(), "request body shorter than CONTENT_LENGTH");
        }
        self.post_data = body;
        Ok(())
    }

    fn parse_body(&mut self) {
        let content_type = match self.env("CONTENT_TYPE") {
            "" => self.header("CONTENT_TYPE"),
            content_type => content_type,
        }
        .to_owned();

        if !content_type.contains("multipart/") {
            self.post_fields = query_string_parse(&self.post_data.to_string_lossy());
            return;
        }

        let Some(boundary) = extract_boundary(&content_type) else {
            warn!(content_type, "multipart body without a boundary");
            return;
        };

        let mut post_fields = BTreeMap::new();
        let mut files = BTreeMap::new();
        for item in parse_multipart(&boundary, &self.post_data) {
            let Some(name) = item.name().map(str::to_owned) else {
                continue;
            };
            if item.is_file() {
                files.insert(name, item);
            } else {
                post_fields.insert(name, item.data().to_string_lossy());
            }
        }
        self.post_fields = post_fields;
        self.files = files;
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use indoc::indoc;
    use micro_fcgi::{Connection, MemoryConnection, OutputProbe};

    use super::*;

    fn parsed(environment: &[&str], body: &'static [u8]) -> (Request, OutputProbe) {
        let (connection, probe) = MemoryConnection::new(environment.iter().copied(), Bytes::from_static(body));
        let mut request = Request::from_connection(connection);
        request.parse().unwrap();
        (request, probe)
    }

    #[test]
    fn environment_and_headers() {
        let (request, _) = parsed(
            &[
                "REQUEST_METHOD=GET",
                "SCRIPT_NAME=/index",
                "QUERY_STRING=a=1&b=x+y",
                "HTTP_HOST=example.com",
                "HTTP_USER_AGENT=curl/8",
                "NO_EQUALS_SIGN",
                "EMPTY=",
            ],
            b"",
        );

        assert_eq!(request.method(), "GET");
        assert_eq!(request.uri(), "/index");
        assert_eq!(request.query_string(), "a=1&b=x+y");
        assert_eq!(request.env("HTTP_HOST"), "example.com");
        assert_eq!(request.env("EMPTY"), "");
        assert_eq!(request.env("NO_EQUALS_SIGN"), "");
        assert_eq!(request.environment().len(), 6);

        assert_eq!(request.header("HOST"), "example.com");
        assert_eq!(request.header("User-Agent"), "curl/8");
        assert_eq!(request.header("HTTP_USER_AGENT"), "curl/8");
        assert_eq!(request.header("missing"), "");
        assert_eq!(request.headers().len(), 2);
        assert!(request.has_header("user-agent"));
        assert!(!request.has_header("missing"));
        assert!(request.has_env("EMPTY"));
        assert!(!request.has_env("NO_EQUALS_SIGN"));

        assert_eq!(request.query_field("a"), "1");
        assert_eq!(request.query_field("b"), "x y");
        assert_eq!(request.query_field("c"), "");
        assert!(request.has_query_field("b"));
        assert!(!request.has_query_field("c"));
        assert!(request.post_data().is_empty());
    }

    #[test]
    fn value_keeps_later_equals_signs() {
        let (request, _) = parsed(&["QUERY_STRING=x=1=2"], b"");
        assert_eq!(request.query_string(), "x=1=2");
    }

    #[test]
    fn duplicate_environment_keys_last_wins() {
        let (request, _) = parsed(&["HTTP_X=1", "HTTP_X=2"], b"");
        assert_eq!(request.header("X"), "2");
        assert_eq!(request.env("HTTP_X"), "2");
    }

    #[test]
    fn cookies() {
        let (request, _) = parsed(&["HTTP_COOKIE=x=1; y=2"], b"");
        assert_eq!(request.cookie("x"), "1");
        assert_eq!(request.cookie("y"), "2");
        assert_eq!(request.cookie("z"), "");
        assert!(request.has_cookie("x"));
        assert!(!request.has_cookie("z"));
        assert_eq!(request.cookies().len(), 2);
    }

    #[test]
    fn urlencoded_body() {
        let (request, _) = parsed(
            &["REQUEST_METHOD=POST", "CONTENT_LENGTH=21", "CONTENT_TYPE=application/x-www-form-urlencoded"],
            b"name=J%C3%B6rg&age=42",
        );
        assert_eq!(request.post_data().len(), 21);
        assert_eq!(request.post_field("name"), "Jörg");
        assert_eq!(request.post_field("age"), "42");
        assert!(request.files().is_empty());
    }

    #[test]
    fn body_limited_to_content_length() {
        let (request, _) = parsed(&["CONTENT_LENGTH=3"], b"a=1&b=2");
        assert_eq!(request.post_data().as_bytes(), b"a=1");
        assert_eq!(request.post_field("a"), "1");
        assert_eq!(request.post_field("b"), "");
    }

    #[test]
    fn short_body_is_kept() {
        let (request, _) = parsed(&["CONTENT_LENGTH=100"], b"k=v");
        assert_eq!(request.post_data().as_bytes(), b"k=v");
        assert_eq!(request.post_field("k"), "v");
    }

    #[test]
    fn missing_or_invalid_content_length_reads_nothing() {
        let (request, _) = parsed(&["CONTENT_LENGTH=abc"], b"k=v");
        assert!(request.post_data().is_empty());

        let (request, _) = parsed(&[], b"k=v");
        assert!(request.post_data().is_empty());
        assert!(request.post_fields().is_empty());
    }

    #[test]
    fn multipart_body() {
        const BODY: &[u8] = b"--XyZ\r\n\
            Content-Disposition: form-data; name=\"f\"\r\n\r\nhello\r\n\
            --XyZ\r\n\
            Content-Disposition: form-data; name=\"up\"; filename=\"a.txt\"\r\n\
            Content-Type: text/plain\r\n\r\nabc\r\n\
            --XyZ--\r\n";
        let content_length = format!("CONTENT_LENGTH={}", BODY.len());
        let (request, _) = parsed(
            &["REQUEST_METHOD=POST", content_length.as_str(), "CONTENT_TYPE=multipart/form-data; boundary=XyZ"],
            BODY,
        );

        assert_eq!(request.post_field("f"), "hello");
        assert_eq!(request.post_fields().len(), 1);

        let file = request.file("up").unwrap();
        assert_eq!(file.filename(), Some("a.txt"));
        assert_eq!(file.content_type(), Some("text/plain"));
        assert_eq!(file.data().as_bytes(), b"abc");
        assert!(request.file("f").is_none());
        assert!(request.has_file("up"));
        assert!(request.has_post_field("f"));
        assert!(!request.has_post_field("up"));
    }

    #[test]
    fn content_type_falls_back_to_header() {
        let body = indoc! {"
            --b0
            Content-Disposition: form-data; name=\"n\"

            v
            --b0--
        "}
        .replace('\n', "\r\n");
        let body: &'static [u8] = Box::leak(body.into_bytes().into_boxed_slice());
        let content_length = format!("CONTENT_LENGTH={}", body.len());

        let (request, _) = parsed(&[content_length.as_str(), "HTTP_CONTENT_TYPE=multipart/form-data; boundary=b0"], body);
        assert_eq!(request.post_field("n"), "v");
    }

    #[test]
    fn multipart_without_boundary_leaves_fields_empty() {
        let (request, _) = parsed(&["CONTENT_LENGTH=5", "CONTENT_TYPE=multipart/form-data"], b"a=b&c");
        assert_eq!(request.post_data().len(), 5);
        assert!(request.post_fields().is_empty());
        assert!(request.files().is_empty());
    }

    #[test]
    fn parse_twice_is_idempotent() {
        let (mut request, _) = parsed(&["CONTENT_LENGTH=3", "QUERY_STRING=q=1", "HTTP_COOKIE=c=2"], b"p=3");
        let first = request.debug_dump();

        request.parse().unwrap();
        assert_eq!(request.debug_dump(), first);
        assert_eq!(request.post_field("p"), "3");
        assert_eq!(request.query_field("q"), "1");
        assert_eq!(request.cookie("c"), "2");
    }

    #[test]
    fn read_error_fails_parse() {
        #[derive(Debug)]
        struct Broken;

        impl Connection for Broken {
            fn environment(&self) -> &[String] {
                static ENV: std::sync::LazyLock<Vec<String>> =
                    std::sync::LazyLock::new(|| vec!["CONTENT_LENGTH=10".to_string()]);
                &ENV
            }

            fn read_input(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::from(io::ErrorKind::ConnectionReset))
            }

            fn write_output(&mut self, _data: &[u8]) -> io::Result<()> {
                Ok(())
            }

            fn finish(&mut self) -> io::Result<()> {
                Ok(())
            }

            fn is_finished(&self) -> bool {
                false
            }
        }

        let mut request = Request::from_connection(Broken);
        assert!(matches!(request.parse(), Err(ParseError::Io { .. })));
    }

    #[test]
    fn debug_dump_lists_everything() {
        let (request, _) = parsed(
            &["REQUEST_METHOD=PUT", "SCRIPT_NAME=/x", "QUERY_STRING=a=1", "HTTP_COOKIE=s=t", "CONTENT_LENGTH=3"],
            b"b=2",
        );
        let dump = request.debug_dump();
        for expected in ["method: PUT", "uri: /x", "query string: a=1", "  HTTP_COOKIE = s=t", "  s = t", "  a = 1", "  b = 2", "post data: 3 bytes", "  b=2"]
        {
            assert!(dump.contains(expected), "{expected:?} missing from\n{dump}");
        }
    }

    #[test]
    fn response_shares_the_connection() {
        let (request, probe) = parsed(&["REQUEST_METHOD=GET"], b"");
        let mut response = request.response();
        response.set_string("hi");
        response.send().unwrap();

        assert!(probe.is_finished());
        assert!(request.connection().lock().unwrap().is_finished());
        assert!(String::from_utf8(probe.output()).unwrap().ends_with("\r\n\r\nhi"));
    }
}
