//! Serialization helpers for dynamically sized protobuf fields.
//!
//! Generated message code uses fixed-size arrays for scalars and these
//! helpers for strings, byte blobs, and repeated strings. Encoding
//! writes a complete tag + length + payload unit; decoding consumes
//! exactly the bytes the surrounding framing declared for the field.
//! Length never comes from inside the payload itself.

use std::fmt;

/// Length-delimited protobuf wire type.
const WIRE_TYPE_LEN: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// Varint ran past 10 bytes or the end of input.
    InvalidVarint,
    /// String field holds invalid UTF-8.
    InvalidUtf8,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::InvalidVarint => write!(f, "invalid varint"),
            CodecError::InvalidUtf8 => write!(f, "string field is not valid UTF-8"),
        }
    }
}

impl std::error::Error for CodecError {}

/// Growable owned string field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PbString {
    buf: String,
}

impl PbString {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the content.
    pub fn set(&mut self, s: &str) {
        self.buf.clear();
        self.append(s);
    }

    /// Append, growing geometrically so repeated appends stay cheap.
    pub fn append(&mut self, s: &str) {
        let needed = self.buf.len() + s.len();
        if needed > self.buf.capacity() {
            self.buf.reserve(needed.max(self.buf.capacity()));
        }
        self.buf.push_str(s);
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl From<&str> for PbString {
    fn from(s: &str) -> Self {
        Self { buf: s.to_string() }
    }
}

/// Growable owned bytes field. Embedded NUL bytes are ordinary content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PbBytes {
    buf: Vec<u8>,
}

impl PbBytes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self { buf: data.to_vec() }
    }

    pub fn set(&mut self, data: &[u8]) {
        self.buf.clear();
        self.append(data);
    }

    pub fn append(&mut self, data: &[u8]) {
        let needed = self.buf.len() + data.len();
        if needed > self.buf.capacity() {
            self.buf.reserve(needed.max(self.buf.capacity()));
        }
        self.buf.extend_from_slice(data);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Append a varint.
pub fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Decode a varint from the front of `input`. Returns the value and
/// the number of bytes consumed.
pub fn decode_varint(input: &[u8]) -> Result<(u64, usize), CodecError> {
    let mut value = 0u64;
    for (i, &byte) in input.iter().enumerate().take(10) {
        value |= ((byte & 0x7f) as u64) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(CodecError::InvalidVarint)
}

fn encode_tag(buf: &mut Vec<u8>, field: u32) {
    encode_varint(buf, ((field as u64) << 3) | WIRE_TYPE_LEN);
}

/// Write one string field: tag, length, bytes.
pub fn encode_string(buf: &mut Vec<u8>, field: u32, value: &str) {
    encode_bytes(buf, field, value.as_bytes());
}

/// Write one bytes field: tag, length, bytes.
pub fn encode_bytes(buf: &mut Vec<u8>, field: u32, value: &[u8]) {
    encode_tag(buf, field);
    encode_varint(buf, value.len() as u64);
    buf.extend_from_slice(value);
}

/// Write a repeated string field, one tag + length + bytes unit per
/// element. An empty slice writes nothing.
pub fn encode_string_array<S: AsRef<str>>(buf: &mut Vec<u8>, field: u32, items: &[S]) {
    for item in items {
        encode_string(buf, field, item.as_ref());
    }
}

/// Decode a string field from exactly the bytes the framing declared.
pub fn decode_string(input: &[u8]) -> Result<PbString, CodecError> {
    let s = std::str::from_utf8(input).map_err(|_| CodecError::InvalidUtf8)?;
    Ok(PbString::from(s))
}

/// Decode a bytes field from exactly the bytes the framing declared.
pub fn decode_bytes(input: &[u8]) -> PbBytes {
    PbBytes::from_slice(input)
}

/// Decode one element of a repeated string field and append it to
/// `out`. Called once per element occurrence.
pub fn decode_string_array_item(input: &[u8], out: &mut Vec<PbString>) -> Result<(), CodecError> {
    out.push(decode_string(input)?);
    Ok(())
}
