//! `multipart/form-data` body parsing
//!
//! A body is split on its boundary token into items. Each item carries the
//! attributes declared in its headers (`name`, `filename`, `Content-Type`, ...) and
//! its payload, which is base64-decoded when a `Content-*` header says so.

use std::collections::BTreeMap;

use memchr::memmem;
use tracing::{debug, trace};

use crate::ByteBuffer;
use crate::codec::base64_decode;

const HEADER_END: &[u8] = b"\r\n\r\n";
const CRLF: &[u8] = b"\r\n";

/// One part of a multipart body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartItem {
    attributes: BTreeMap<String, String>,
    data: ByteBuffer,
}

impl MultipartItem {
    pub fn new(attributes: BTreeMap<String, String>, data: ByteBuffer) -> Self {
        Self { attributes, data }
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Looks up an attribute by its exact key
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.attribute("name")
    }

    pub fn filename(&self) -> Option<&str> {
        self.attribute("filename")
    }

    /// The part's `Content-Type`, matched case-insensitively
    pub fn content_type(&self) -> Option<&str> {
        self.attributes.iter().find(|(key, _)| key.eq_ignore_ascii_case("content-type")).map(|(_, value)| value.as_str())
    }

    /// An item is a file upload when it declares a `filename`
    pub fn is_file(&self) -> bool {
        self.attributes.contains_key("filename")
    }

    pub fn data(&self) -> &ByteBuffer {
        &self.data
    }

    pub fn into_data(self) -> ByteBuffer {
        self.data
    }
}

/// Splits `body` into items on the boundary token `boundary`.
///
/// Items without a `name` attribute, and items whose headers never end before the
/// next boundary, are skipped. Input that holds no boundary yields no items.
pub fn parse_multipart(boundary: &str, body: &[u8]) -> Vec<MultipartItem> {
    let mut items = Vec::new();
    if boundary.is_empty() {
        debug!("empty multipart boundary");
        return items;
    }

    let finder = memmem::Finder::new(boundary.as_bytes());
    let Some(mut position) = finder.find(body) else {
        debug!(boundary, "multipart boundary not found in body");
        return items;
    };

    loop {
        let start = skip_line_break(body, position + boundary.len());
        let Some(next) = finder.find(&body[start..]).map(|offset| start + offset) else {
            break;
        };

        match parse_item(&body[start..next]) {
            Some(item) if item.name().is_some() => items.push(item),
            Some(_) => debug!("dropping multipart item without a name"),
            None => debug!(offset = start, "skipping multipart item without a header terminator"),
        }
        position = next;
    }

    trace!(count = items.len(), "multipart body parsed");
    items
}

/// Extracts the boundary token from a `multipart/*` content type.
pub fn extract_boundary(content_type: &str) -> Option<String> {
    if let Ok(mime) = content_type.parse::<mime::Mime>()
        && mime.type_() == mime::MULTIPART
        && let Some(boundary) = mime.get_param(mime::BOUNDARY)
    {
        return Some(unquote(boundary.as_str()).to_owned()).filter(|b| !b.is_empty());
    }

    // boundaries with characters outside the token grammar
    content_type
        .split(';')
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| unquote(value.trim()).to_owned())
        .filter(|b| !b.is_empty())
}

fn skip_line_break(body: &[u8], position: usize) -> usize {
    let position = position.min(body.len());
    let rest = &body[position..];
    if rest.starts_with(CRLF) {
        position + 2
    } else if rest.starts_with(b"\n") {
        position + 1
    } else {
        position
    }
}

/// `region` runs from just after a boundary line to the start of the next boundary token
fn parse_item(region: &[u8]) -> Option<MultipartItem> {
    let (head, payload) = if let Some(rest) = region.strip_prefix(CRLF) {
        (&region[..0], rest)
    } else {
        let separator = memmem::find(region, HEADER_END)?;
        (&region[..separator], &region[separator + HEADER_END.len()..])
    };

    let payload = payload.strip_suffix(b"--").unwrap_or(payload);
    let payload = payload.strip_suffix(CRLF).unwrap_or(payload);

    let head = String::from_utf8_lossy(head);
    let folded = head.split("\r\n").collect::<Vec<_>>().join("; ");

    let mut attributes = BTreeMap::new();
    let mut base64_encoded = false;
    for declaration in split_declarations(&folded) {
        let declaration = declaration.trim();
        if declaration.is_empty() {
            continue;
        }

        let (key, value) = declaration
            .split_once('=')
            .or_else(|| declaration.split_once(':'))
            .map(|(key, value)| (key.trim(), unquote(value.trim())))
            .unwrap_or((declaration, ""));

        if key.to_ascii_lowercase().contains("content") && value.to_ascii_lowercase().contains("base64") {
            base64_encoded = true;
        }
        attributes.insert(key.to_owned(), value.to_owned());
    }

    let data = if base64_encoded && !payload.is_empty() {
        let compact: String = String::from_utf8_lossy(payload).chars().filter(|c| !c.is_ascii_whitespace()).collect();
        base64_decode(&compact)
    } else {
        ByteBuffer::from_slice(payload)
    };

    Some(MultipartItem::new(attributes, data))
}

/// Splits on `;` outside of double quotes
fn split_declarations(head: &str) -> Vec<&str> {
    let mut declarations = Vec::new();
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in head.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ';' if !quoted => {
                declarations.push(&head[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    declarations.push(&head[start..]);
    declarations
}

fn unquote(value: &str) -> &str {
    match value.strip_prefix('"') {
        Some(inner) => inner.strip_suffix('"').unwrap_or(inner),
        None => value,
    }
}
