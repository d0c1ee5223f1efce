//! ## Http long-polling payloads
//!
//! A payload is the body of one polling request or response: several packets framed together.
//! * engine.io v4: packets separated by a record separator, binary packets are base64 encoded
//! * engine.io v3: length-prefixed packets, either as a *string* payload or as a *binary* payload
//!   made of type-tagged records when the channel supports binary

use bytes::Bytes;

pub mod decoder;
pub mod encoder;

pub(crate) const PACKET_SEPARATOR_V4: u8 = b'\x1e';
pub(crate) const STRING_PACKET_SEPARATOR_V3: u8 = b':';
pub(crate) const BINARY_PACKET_SEPARATOR_V3: u8 = 0xff;

/// The maximum number of length digits of a v3 binary record
pub(crate) const MAX_BINARY_LEN_DIGITS_V3: usize = 310;

/// A framed payload ready to be sent as a request body or received from a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// The framed data
    pub data: Bytes,
    /// If the payload is made of binary records (`application/octet-stream`)
    pub has_binary: bool,
}

impl Payload {
    /// Create a new payload
    pub fn new(data: impl Into<Bytes>, has_binary: bool) -> Self {
        Self {
            data: data.into(),
            has_binary,
        }
    }

    /// The `Content-Type` that should be used to send this payload
    pub fn content_type(&self) -> &'static str {
        if self.has_binary {
            "application/octet-stream"
        } else {
            "text/plain; charset=UTF-8"
        }
    }
}
