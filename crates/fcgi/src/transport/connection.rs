use std::io::{self, Read, Write};
use std::net::Shutdown;

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace, warn};

use crate::codec::{RecordCodec, encode_stream};
use crate::protocol::{
    BeginRequestBody, NULL_REQUEST_ID, ProtocolError, ProtocolStatus, Record, RecordType, Role, params,
};
use crate::transport::{Connection, Stream};

const READ_CHUNK: usize = 8 * 1024;

/// Values reported to GET_VALUES queries: one request per connection, no multiplexing
const MANAGEMENT_VALUES: [(&str, &str); 3] = [("FCGI_MAX_CONNS", "1"), ("FCGI_MAX_REQS", "1"), ("FCGI_MPXS_CONNS", "0")];

/// A FastCGI connection carrying exactly one Responder request.
///
/// [`establish`](FcgiConnection::establish) consumes the BEGIN_REQUEST and PARAMS
/// records; STDIN is pulled lazily by [`Connection::read_input`]. The socket is
/// closed once the request is finished or the connection is dropped.
#[derive(Debug)]
pub struct FcgiConnection {
    stream: Stream,
    codec: RecordCodec,
    read_buf: BytesMut,
    write_buf: BytesMut,
    request_id: u16,
    keep_conn: bool,
    environment: Vec<String>,
    stdin: BytesMut,
    stdin_done: bool,
    aborted: bool,
    finished: bool,
}

impl FcgiConnection {
    /// Reads the request head (BEGIN_REQUEST and the PARAMS stream) from `stream`.
    ///
    /// Management records received on the way are answered in place.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] if the peer closes early, requests a role other
    /// than Responder, aborts the request or sends malformed records.
    pub fn establish(stream: Stream) -> Result<Self, ProtocolError> {
        let mut connection = Self {
            stream,
            codec: RecordCodec::new(),
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            write_buf: BytesMut::new(),
            request_id: NULL_REQUEST_ID,
            keep_conn: false,
            environment: Vec::new(),
            stdin: BytesMut::new(),
            stdin_done: false,
            aborted: false,
            finished: false,
        };

        connection.read_begin_request()?;
        connection.read_params()?;
        debug!(request_id = connection.request_id, params = connection.environment.len(), "fastcgi request established");
        Ok(connection)
    }

    pub fn request_id(&self) -> u16 {
        self.request_id
    }

    /// Whether the web server asked to keep the connection open. Connections are
    /// closed after every request regardless.
    pub fn keep_conn(&self) -> bool {
        self.keep_conn
    }

    /// Whether the web server sent ABORT_REQUEST
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    fn read_record(&mut self) -> Result<Record, ProtocolError> {
        loop {
            if let Some(record) = self.codec.decode(&mut self.read_buf)? {
                return Ok(record);
            }

            let mut chunk = [0u8; READ_CHUNK];
            let read = match self.stream.read(&mut chunk) {
                Ok(0) => return Err(ProtocolError::UnexpectedEof),
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            self.read_buf.extend_from_slice(&chunk[..read]);
        }
    }

    fn send_records(&mut self, records: impl IntoIterator<Item = Record>) -> Result<(), ProtocolError> {
        self.write_buf.clear();
        for record in records {
            self.codec.encode(record, &mut self.write_buf)?;
        }
        self.stream.write_all(&self.write_buf)?;
        self.write_buf.clear();
        Ok(())
    }

    /// Answers records that are not part of the current request.
    ///
    /// Returns `true` when the record was consumed.
    fn handle_foreign_record(&mut self, record: &Record) -> Result<bool, ProtocolError> {
        if record.request_id == NULL_REQUEST_ID {
            self.handle_management(record)?;
            return Ok(true);
        }

        if self.request_id != NULL_REQUEST_ID && record.request_id != self.request_id {
            if record.record_type == RecordType::BeginRequest {
                warn!(request_id = record.request_id, "multiplexed request refused");
                self.send_records([Record::end_request(record.request_id, 0, ProtocolStatus::CantMpxConn)])?;
            } else {
                trace!(request_id = record.request_id, record_type = ?record.record_type, "ignore record of another request");
            }
            return Ok(true);
        }

        Ok(false)
    }

    fn handle_management(&mut self, record: &Record) -> Result<(), ProtocolError> {
        match record.record_type {
            RecordType::GetValues => {
                let asked = params::decode_pairs(&record.content)?;
                let mut content = BytesMut::new();
                for (name, _) in asked {
                    if let Some((name, value)) = MANAGEMENT_VALUES.iter().find(|(known, _)| known.as_bytes() == name) {
                        params::encode_pair(name.as_bytes(), value.as_bytes(), &mut content);
                    }
                }
                self.send_records([Record::new(RecordType::GetValuesResult, NULL_REQUEST_ID, content.freeze())])
            }
            record_type => {
                debug!(?record_type, "unknown management record");
                self.send_records([Record::unknown_type(record_type)])
            }
        }
    }

    fn read_begin_request(&mut self) -> Result<(), ProtocolError> {
        loop {
            let record = self.read_record()?;
            if self.handle_foreign_record(&record)? {
                continue;
            }

            if record.record_type != RecordType::BeginRequest {
                trace!(record_type = ?record.record_type, request_id = record.request_id, "skip record before begin request");
                continue;
            }

            let body = BeginRequestBody::parse(&record.content)
                .ok_or_else(|| ProtocolError::invalid_begin_request(format!("{} bytes body", record.content.len())))?;

            if body.role != Role::Responder {
                self.send_records([Record::end_request(record.request_id, 0, ProtocolStatus::UnknownRole)])?;
                return Err(ProtocolError::UnsupportedRole(body.role.as_u16()));
            }

            self.request_id = record.request_id;
            self.keep_conn = body.keep_conn();
            return Ok(());
        }
    }

    fn read_params(&mut self) -> Result<(), ProtocolError> {
        let mut raw = BytesMut::new();
        loop {
            let record = self.read_record()?;
            if self.handle_foreign_record(&record)? {
                continue;
            }

            match record.record_type {
                RecordType::Params if record.is_end_of_stream() => break,
                RecordType::Params => raw.extend_from_slice(&record.content),
                RecordType::AbortRequest => return Err(ProtocolError::Aborted(self.request_id)),
                record_type => return Err(ProtocolError::unexpected_record(record_type, record.request_id)),
            }
        }

        self.environment = params::into_environment(params::decode_pairs(&raw)?);
        Ok(())
    }

    fn fill_stdin(&mut self) -> Result<(), ProtocolError> {
        while self.stdin.is_empty() && !self.stdin_done {
            let record = self.read_record()?;
            if self.handle_foreign_record(&record)? {
                continue;
            }

            match record.record_type {
                RecordType::Stdin if record.is_end_of_stream() => self.stdin_done = true,
                RecordType::Stdin => self.stdin.extend_from_slice(&record.content),
                RecordType::AbortRequest => {
                    warn!(request_id = self.request_id, "request aborted while reading stdin");
                    self.aborted = true;
                    self.stdin_done = true;
                }
                record_type => trace!(?record_type, "ignore record while reading stdin"),
            }
        }
        Ok(())
    }
}

impl Connection for FcgiConnection {
    fn environment(&self) -> &[String] {
        &self.environment
    }

    fn read_input(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.fill_stdin()?;

        let len = buf.len().min(self.stdin.len());
        buf[..len].copy_from_slice(&self.stdin[..len]);
        self.stdin.advance(len);
        Ok(len)
    }

    fn write_output(&mut self, data: &[u8]) -> io::Result<()> {
        if self.finished {
            return Err(io::Error::other("fastcgi request already finished"));
        }

        self.write_buf.clear();
        encode_stream(RecordType::Stdout, self.request_id, data, &mut self.write_buf)?;
        self.stream.write_all(&self.write_buf)?;
        self.write_buf.clear();
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }

        let request_id = self.request_id;
        self.send_records([
            Record::end_of_stream(RecordType::Stdout, request_id),
            Record::end_request(request_id, 0, ProtocolStatus::RequestComplete),
        ])?;
        self.stream.flush()?;
        self.finished = true;

        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            trace!(cause = %e, "shutdown after finish");
        }
        debug!(request_id, "fastcgi request finished");
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Drop for FcgiConnection {
    fn drop(&mut self) {
        if !self.finished {
            debug!(request_id = self.request_id, "fastcgi connection released without a response");
            let _ = self.stream.shutdown(Shutdown::Both);
        }
    }
}
