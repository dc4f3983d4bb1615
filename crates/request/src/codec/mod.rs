//! Text and encoding helpers shared by request parsing and response writing.

mod base64;
mod text;
mod url;

pub use self::base64::{base64_decode, base64_encode};
pub use text::{cookie_parse, query_string_parse, str_split, string_trim};
pub use url::{url_decode, url_encode};
