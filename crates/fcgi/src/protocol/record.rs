use bytes::Bytes;

/// The only protocol version defined by the FastCGI specification
pub const FCGI_VERSION_1: u8 = 1;

/// Size in bytes of every record header
pub const HEADER_LEN: usize = 8;

/// Maximum number of content bytes a single record can carry
pub const MAX_CONTENT_LEN: usize = u16::MAX as usize;

/// Request id reserved for management records
pub const NULL_REQUEST_ID: u16 = 0;

/// `flags` bit of a BEGIN_REQUEST body asking the application to keep the connection open
pub const FCGI_KEEP_CONN: u8 = 1;

/// Record types defined by FastCGI 1.0, section 8.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RecordType {
    BeginRequest,
    AbortRequest,
    EndRequest,
    Params,
    Stdin,
    Stdout,
    Stderr,
    Data,
    GetValues,
    GetValuesResult,
    UnknownType,
    /// A type this implementation does not know about
    Other(u8),
}

impl RecordType {
    pub fn as_u8(self) -> u8 {
        match self {
            RecordType::BeginRequest => 1,
            RecordType::AbortRequest => 2,
            RecordType::EndRequest => 3,
            RecordType::Params => 4,
            RecordType::Stdin => 5,
            RecordType::Stdout => 6,
            RecordType::Stderr => 7,
            RecordType::Data => 8,
            RecordType::GetValues => 9,
            RecordType::GetValuesResult => 10,
            RecordType::UnknownType => 11,
            RecordType::Other(t) => t,
        }
    }

    /// Management records carry the null request id and are not bound to a request
    pub fn is_management(self) -> bool {
        matches!(self, RecordType::GetValues | RecordType::GetValuesResult | RecordType::UnknownType)
    }
}

impl From<u8> for RecordType {
    fn from(value: u8) -> Self {
        match value {
            1 => RecordType::BeginRequest,
            2 => RecordType::AbortRequest,
            3 => RecordType::EndRequest,
            4 => RecordType::Params,
            5 => RecordType::Stdin,
            6 => RecordType::Stdout,
            7 => RecordType::Stderr,
            8 => RecordType::Data,
            9 => RecordType::GetValues,
            10 => RecordType::GetValuesResult,
            11 => RecordType::UnknownType,
            t => RecordType::Other(t),
        }
    }
}

/// The role requested by a BEGIN_REQUEST record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    Responder,
    Authorizer,
    Filter,
    Other(u16),
}

impl From<u16> for Role {
    fn from(value: u16) -> Self {
        match value {
            1 => Role::Responder,
            2 => Role::Authorizer,
            3 => Role::Filter,
            r => Role::Other(r),
        }
    }
}

impl Role {
    pub fn as_u16(self) -> u16 {
        match self {
            Role::Responder => 1,
            Role::Authorizer => 2,
            Role::Filter => 3,
            Role::Other(r) => r,
        }
    }
}

/// `protocolStatus` of an END_REQUEST record
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProtocolStatus {
    RequestComplete,
    CantMpxConn,
    Overloaded,
    UnknownRole,
}

impl ProtocolStatus {
    pub fn as_u8(self) -> u8 {
        match self {
            ProtocolStatus::RequestComplete => 0,
            ProtocolStatus::CantMpxConn => 1,
            ProtocolStatus::Overloaded => 2,
            ProtocolStatus::UnknownRole => 3,
        }
    }
}

/// A complete FastCGI record: header fields plus content, padding already stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub record_type: RecordType,
    pub request_id: u16,
    pub content: Bytes,
}

impl Record {
    pub fn new(record_type: RecordType, request_id: u16, content: impl Into<Bytes>) -> Self {
        Self { record_type, request_id, content: content.into() }
    }

    /// An empty record of a stream type marks the end of that stream
    pub fn end_of_stream(record_type: RecordType, request_id: u16) -> Self {
        Self::new(record_type, request_id, Bytes::new())
    }

    pub fn begin_request(request_id: u16, role: Role, flags: u8) -> Self {
        let role = role.as_u16().to_be_bytes();
        let body = [role[0], role[1], flags, 0, 0, 0, 0, 0];
        Self::new(RecordType::BeginRequest, request_id, Bytes::copy_from_slice(&body))
    }

    pub fn end_request(request_id: u16, app_status: u32, protocol_status: ProtocolStatus) -> Self {
        let app = app_status.to_be_bytes();
        let body = [app[0], app[1], app[2], app[3], protocol_status.as_u8(), 0, 0, 0];
        Self::new(RecordType::EndRequest, request_id, Bytes::copy_from_slice(&body))
    }

    pub fn unknown_type(record_type: RecordType) -> Self {
        let body = [record_type.as_u8(), 0, 0, 0, 0, 0, 0, 0];
        Self::new(RecordType::UnknownType, NULL_REQUEST_ID, Bytes::copy_from_slice(&body))
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.content.is_empty()
    }
}

/// Decoded body of a BEGIN_REQUEST record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BeginRequestBody {
    pub role: Role,
    pub flags: u8,
}

impl BeginRequestBody {
    pub fn parse(content: &[u8]) -> Option<Self> {
        if content.len() < 8 {
            return None;
        }
        let role = u16::from_be_bytes([content[0], content[1]]);
        Some(Self { role: role.into(), flags: content[2] })
    }

    pub fn keep_conn(&self) -> bool {
        self.flags & FCGI_KEEP_CONN != 0
    }
}

/// Decoded body of an END_REQUEST record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EndRequestBody {
    pub app_status: u32,
    pub protocol_status: u8,
}

impl EndRequestBody {
    pub fn parse(content: &[u8]) -> Option<Self> {
        if content.len() < 8 {
            return None;
        }
        let app_status = u32::from_be_bytes([content[0], content[1], content[2], content[3]]);
        Some(Self { app_status, protocol_status: content[4] })
    }
}
