//! HPACK header compression (RFC 7541).
//!
//! Implements the static table, a size-accounted dynamic table with
//! eviction, integer prefix coding, and plain or Huffman string
//! literals. The encoder prefers indexed representations and falls back
//! to literals with incremental indexing.

use std::collections::VecDeque;
use std::fmt;

use crate::huffman;

/// Default dynamic table size (SETTINGS_HEADER_TABLE_SIZE default).
pub const DEFAULT_TABLE_SIZE: usize = 4_096;

/// Per-entry overhead used for dynamic table size accounting.
const ENTRY_OVERHEAD: usize = 32;

/// A decoded header name/value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

impl HeaderField {
    pub fn new(name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    fn size(&self) -> usize {
        self.name.len() + self.value.len() + ENTRY_OVERHEAD
    }
}

/// HPACK decoding errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HpackError {
    /// Index points outside both tables.
    InvalidIndex(usize),
    /// Integer representation overflows.
    IntegerOverflow,
    /// Input ended inside a representation.
    UnexpectedEof,
    /// Huffman-coded literal failed to decode.
    InvalidHuffman,
    /// Dynamic table size update above the negotiated maximum.
    TableSizeUpdateTooLarge { requested: usize, max: usize },
}

impl fmt::Display for HpackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HpackError::InvalidIndex(idx) => write!(f, "invalid header table index {}", idx),
            HpackError::IntegerOverflow => write!(f, "integer representation overflow"),
            HpackError::UnexpectedEof => write!(f, "truncated header block"),
            HpackError::InvalidHuffman => write!(f, "invalid huffman-coded literal"),
            HpackError::TableSizeUpdateTooLarge { requested, max } => {
                write!(f, "table size update {} exceeds maximum {}", requested, max)
            }
        }
    }
}

impl std::error::Error for HpackError {}

impl From<huffman::HuffmanError> for HpackError {
    fn from(_: huffman::HuffmanError) -> Self {
        HpackError::InvalidHuffman
    }
}

/// Static table (RFC 7541 Appendix A). Indices 1 through 61.
#[rustfmt::skip]
static STATIC_TABLE: [(&[u8], &[u8]); 61] = [
    (b":authority", b""),
    (b":method", b"GET"),
    (b":method", b"POST"),
    (b":path", b"/"),
    (b":path", b"/index.html"),
    (b":scheme", b"http"),
    (b":scheme", b"https"),
    (b":status", b"200"),
    (b":status", b"204"),
    (b":status", b"206"),
    (b":status", b"304"),
    (b":status", b"400"),
    (b":status", b"404"),
    (b":status", b"500"),
    (b"accept-charset", b""),
    (b"accept-encoding", b"gzip, deflate"),
    (b"accept-language", b""),
    (b"accept-ranges", b""),
    (b"accept", b""),
    (b"access-control-allow-origin", b""),
    (b"age", b""),
    (b"allow", b""),
    (b"authorization", b""),
    (b"cache-control", b""),
    (b"content-disposition", b""),
    (b"content-encoding", b""),
    (b"content-language", b""),
    (b"content-length", b""),
    (b"content-location", b""),
    (b"content-range", b""),
    (b"content-type", b""),
    (b"cookie", b""),
    (b"date", b""),
    (b"etag", b""),
    (b"expect", b""),
    (b"expires", b""),
    (b"from", b""),
    (b"host", b""),
    (b"if-match", b""),
    (b"if-modified-since", b""),
    (b"if-none-match", b""),
    (b"if-range", b""),
    (b"if-unmodified-since", b""),
    (b"last-modified", b""),
    (b"link", b""),
    (b"location", b""),
    (b"max-forwards", b""),
    (b"proxy-authenticate", b""),
    (b"proxy-authorization", b""),
    (b"range", b""),
    (b"referer", b""),
    (b"refresh", b""),
    (b"retry-after", b""),
    (b"server", b""),
    (b"set-cookie", b""),
    (b"strict-transport-security", b""),
    (b"transfer-encoding", b""),
    (b"user-agent", b""),
    (b"vary", b""),
    (b"via", b""),
    (b"www-authenticate", b""),
];

/// FIFO dynamic table with size-based eviction.
struct DynamicTable {
    entries: VecDeque<HeaderField>,
    size: usize,
    max_size: usize,
}

impl DynamicTable {
    fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            size: 0,
            max_size,
        }
    }

    fn insert(&mut self, field: HeaderField) {
        let entry_size = field.size();
        // An entry larger than the table empties it (RFC 7541 Section 4.4).
        if entry_size > self.max_size {
            self.entries.clear();
            self.size = 0;
            return;
        }
        while self.size + entry_size > self.max_size {
            if let Some(evicted) = self.entries.pop_back() {
                self.size -= evicted.size();
            } else {
                break;
            }
        }
        self.size += entry_size;
        self.entries.push_front(field);
    }

    fn get(&self, index: usize) -> Option<&HeaderField> {
        self.entries.get(index)
    }

    fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        while self.size > self.max_size {
            if let Some(evicted) = self.entries.pop_back() {
                self.size -= evicted.size();
            } else {
                break;
            }
        }
    }

    /// Position of an exact name/value match, if present.
    fn find(&self, name: &[u8], value: &[u8]) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.name == name && e.value == value)
    }

    fn find_name(&self, name: &[u8]) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }
}

/// Encode an integer with the given prefix size (RFC 7541 Section 5.1).
fn encode_integer(out: &mut Vec<u8>, mut value: usize, prefix_bits: u8, first_byte_flags: u8) {
    let max_prefix = (1usize << prefix_bits) - 1;
    if value < max_prefix {
        out.push(first_byte_flags | value as u8);
        return;
    }
    out.push(first_byte_flags | max_prefix as u8);
    value -= max_prefix;
    while value >= 128 {
        out.push((value % 128) as u8 | 0x80);
        value /= 128;
    }
    out.push(value as u8);
}

/// Decode an integer with the given prefix size. Advances `pos`.
fn decode_integer(input: &[u8], pos: &mut usize, prefix_bits: u8) -> Result<usize, HpackError> {
    if *pos >= input.len() {
        return Err(HpackError::UnexpectedEof);
    }
    let max_prefix = (1usize << prefix_bits) - 1;
    let mut value = (input[*pos] as usize) & max_prefix;
    *pos += 1;
    if value < max_prefix {
        return Ok(value);
    }
    let mut shift = 0u32;
    loop {
        if *pos >= input.len() {
            return Err(HpackError::UnexpectedEof);
        }
        let byte = input[*pos];
        *pos += 1;
        if shift > 28 {
            return Err(HpackError::IntegerOverflow);
        }
        value = value
            .checked_add(((byte & 0x7f) as usize) << shift)
            .ok_or(HpackError::IntegerOverflow)?;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

/// Encodes header lists into HPACK blocks.
pub struct HpackEncoder {
    table: DynamicTable,
    use_huffman: bool,
}

impl Default for HpackEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HpackEncoder {
    pub fn new() -> Self {
        Self {
            table: DynamicTable::new(DEFAULT_TABLE_SIZE),
            use_huffman: true,
        }
    }

    /// Disable Huffman coding of literals. Test hook; the wire stays valid.
    pub fn set_huffman(&mut self, enabled: bool) {
        self.use_huffman = enabled;
    }

    /// Apply the peer's SETTINGS_HEADER_TABLE_SIZE.
    pub fn set_max_table_size(&mut self, size: usize) {
        self.table.set_max_size(size);
    }

    /// Encode `headers` as one header block appended to `out`.
    pub fn encode(&mut self, headers: &[HeaderField], out: &mut Vec<u8>) {
        for field in headers {
            self.encode_field(field, out);
        }
    }

    fn encode_field(&mut self, field: &HeaderField, out: &mut Vec<u8>) {
        // Exact match: indexed representation.
        if let Some(idx) = static_find(&field.name, &field.value) {
            encode_integer(out, idx, 7, 0x80);
            return;
        }
        if let Some(pos) = self.table.find(&field.name, &field.value) {
            encode_integer(out, STATIC_TABLE.len() + 1 + pos, 7, 0x80);
            return;
        }

        // Name match: literal with incremental indexing, indexed name.
        let name_index = static_find_name(&field.name)
            .or_else(|| self.table.find_name(&field.name).map(|p| STATIC_TABLE.len() + 1 + p));

        match name_index {
            Some(idx) => {
                encode_integer(out, idx, 6, 0x40);
            }
            None => {
                out.push(0x40);
                self.encode_string(&field.name, out);
            }
        }
        self.encode_string(&field.value, out);
        self.table.insert(field.clone());
    }

    fn encode_string(&self, s: &[u8], out: &mut Vec<u8>) {
        if self.use_huffman {
            let hlen = huffman::encoded_len(s);
            if hlen < s.len() {
                encode_integer(out, hlen, 7, 0x80);
                huffman::encode(s, out);
                return;
            }
        }
        encode_integer(out, s.len(), 7, 0);
        out.extend_from_slice(s);
    }
}

fn static_find(name: &[u8], value: &[u8]) -> Option<usize> {
    STATIC_TABLE
        .iter()
        .position(|&(n, v)| n == name && v == value)
        .map(|p| p + 1)
}

fn static_find_name(name: &[u8]) -> Option<usize> {
    STATIC_TABLE
        .iter()
        .position(|&(n, _)| n == name)
        .map(|p| p + 1)
}

/// Decodes HPACK header blocks into header lists.
pub struct HpackDecoder {
    table: DynamicTable,
    /// Upper bound the decoder accepts in table size updates.
    max_table_size: usize,
}

impl Default for HpackDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HpackDecoder {
    pub fn new() -> Self {
        Self {
            table: DynamicTable::new(DEFAULT_TABLE_SIZE),
            max_table_size: DEFAULT_TABLE_SIZE,
        }
    }

    /// Raise or lower the size bound advertised in our SETTINGS.
    pub fn set_max_table_size(&mut self, size: usize) {
        self.max_table_size = size;
        if self.table.max_size > size {
            self.table.set_max_size(size);
        }
    }

    /// Decode one complete header block.
    pub fn decode(&mut self, input: &[u8]) -> Result<Vec<HeaderField>, HpackError> {
        let mut headers = Vec::new();
        let mut pos = 0;

        while pos < input.len() {
            let byte = input[pos];
            if byte & 0x80 != 0 {
                // Indexed header field.
                let index = decode_integer(input, &mut pos, 7)?;
                headers.push(self.lookup(index)?);
            } else if byte & 0xc0 == 0x40 {
                // Literal with incremental indexing.
                let field = self.decode_literal(input, &mut pos, 6)?;
                self.table.insert(field.clone());
                headers.push(field);
            } else if byte & 0xe0 == 0x20 {
                // Dynamic table size update.
                let size = decode_integer(input, &mut pos, 5)?;
                if size > self.max_table_size {
                    return Err(HpackError::TableSizeUpdateTooLarge {
                        requested: size,
                        max: self.max_table_size,
                    });
                }
                self.table.set_max_size(size);
            } else {
                // Literal without indexing (0x00) or never-indexed (0x10).
                let field = self.decode_literal(input, &mut pos, 4)?;
                headers.push(field);
            }
        }

        Ok(headers)
    }

    fn lookup(&self, index: usize) -> Result<HeaderField, HpackError> {
        if index == 0 {
            return Err(HpackError::InvalidIndex(0));
        }
        if index <= STATIC_TABLE.len() {
            let (name, value) = STATIC_TABLE[index - 1];
            return Ok(HeaderField::new(name, value));
        }
        self.table
            .get(index - STATIC_TABLE.len() - 1)
            .cloned()
            .ok_or(HpackError::InvalidIndex(index))
    }

    fn decode_literal(
        &mut self,
        input: &[u8],
        pos: &mut usize,
        prefix_bits: u8,
    ) -> Result<HeaderField, HpackError> {
        let name_index = decode_integer(input, pos, prefix_bits)?;
        let name = if name_index == 0 {
            self.decode_string(input, pos)?
        } else {
            self.lookup(name_index)?.name
        };
        let value = self.decode_string(input, pos)?;
        Ok(HeaderField { name, value })
    }

    fn decode_string(&self, input: &[u8], pos: &mut usize) -> Result<Vec<u8>, HpackError> {
        if *pos >= input.len() {
            return Err(HpackError::UnexpectedEof);
        }
        let huffman_coded = input[*pos] & 0x80 != 0;
        let len = decode_integer(input, pos, 7)?;
        if *pos + len > input.len() {
            return Err(HpackError::UnexpectedEof);
        }
        let raw = &input[*pos..*pos + len];
        *pos += len;
        if huffman_coded {
            Ok(huffman::decode(raw)?)
        } else {
            Ok(raw.to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, value: &str) -> HeaderField {
        HeaderField::new(name.as_bytes(), value.as_bytes())
    }

    #[test]
    fn test_integer_small_value() {
        let mut out = Vec::new();
        encode_integer(&mut out, 10, 5, 0);
        assert_eq!(out, [10]);
        let mut pos = 0;
        assert_eq!(decode_integer(&out, &mut pos, 5).unwrap(), 10);
    }

    #[test]
    fn test_integer_multi_byte() {
        // RFC 7541 C.1.2: 1337 with a 5-bit prefix
        let mut out = Vec::new();
        encode_integer(&mut out, 1337, 5, 0);
        assert_eq!(out, [0x1f, 0x9a, 0x0a]);
        let mut pos = 0;
        assert_eq!(decode_integer(&out, &mut pos, 5).unwrap(), 1337);
        assert_eq!(pos, 3);
    }

    #[test]
    fn test_integer_overflow_rejected() {
        let input = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f];
        let mut pos = 0;
        assert_eq!(
            decode_integer(&input, &mut pos, 7),
            Err(HpackError::IntegerOverflow)
        );
    }

    #[test]
    fn test_integer_truncated() {
        let input = [0x1f, 0x9a];
        let mut pos = 0;
        assert_eq!(
            decode_integer(&input, &mut pos, 5),
            Err(HpackError::UnexpectedEof)
        );
    }

    #[test]
    fn test_static_indexed_field() {
        // Index 2 is :method GET
        let mut decoder = HpackDecoder::new();
        let headers = decoder.decode(&[0x82]).unwrap();
        assert_eq!(headers, vec![field(":method", "GET")]);
    }

    #[test]
    fn test_index_zero_rejected() {
        let mut decoder = HpackDecoder::new();
        assert_eq!(
            decoder.decode(&[0x80]),
            Err(HpackError::InvalidIndex(0))
        );
    }

    #[test]
    fn test_rfc_literal_with_indexing() {
        // RFC 7541 C.2.1: custom-key: custom-header
        let input = [
            0x40, 0x0a, b'c', b'u', b's', b't', b'o', b'm', b'-', b'k', b'e', b'y', 0x0d, b'c',
            b'u', b's', b't', b'o', b'm', b'-', b'h', b'e', b'a', b'd', b'e', b'r',
        ];
        let mut decoder = HpackDecoder::new();
        let headers = decoder.decode(&input).unwrap();
        assert_eq!(headers, vec![field("custom-key", "custom-header")]);
        // The entry is now in the dynamic table at index 62.
        let headers = decoder.decode(&[0xbe]).unwrap();
        assert_eq!(headers, vec![field("custom-key", "custom-header")]);
    }

    #[test]
    fn test_roundtrip_request_headers() {
        let headers = vec![
            field(":method", "POST"),
            field(":scheme", "https"),
            field(":path", "/helloworld.Greeter/SayHello"),
            field(":authority", "device.example.com"),
            field("content-type", "application/grpc+proto"),
            field("te", "trailers"),
            field("x-request-id", "abc123"),
        ];
        let mut encoder = HpackEncoder::new();
        let mut decoder = HpackDecoder::new();
        let mut block = Vec::new();
        encoder.encode(&headers, &mut block);
        assert_eq!(decoder.decode(&block).unwrap(), headers);
    }

    #[test]
    fn test_roundtrip_without_huffman() {
        let headers = vec![field("grpc-timeout", "5000m"), field("grpc-encoding", "gzip")];
        let mut encoder = HpackEncoder::new();
        encoder.set_huffman(false);
        let mut decoder = HpackDecoder::new();
        let mut block = Vec::new();
        encoder.encode(&headers, &mut block);
        assert_eq!(decoder.decode(&block).unwrap(), headers);
    }

    #[test]
    fn test_dynamic_table_reuse_shrinks_second_block() {
        let headers = vec![field("x-device-token", "0123456789abcdef0123456789abcdef")];
        let mut encoder = HpackEncoder::new();
        let mut decoder = HpackDecoder::new();

        let mut first = Vec::new();
        encoder.encode(&headers, &mut first);
        assert_eq!(decoder.decode(&first).unwrap(), headers);

        let mut second = Vec::new();
        encoder.encode(&headers, &mut second);
        assert_eq!(decoder.decode(&second).unwrap(), headers);

        // Second block is a bare index into the dynamic table.
        assert!(second.len() < first.len());
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn test_eviction_under_small_table() {
        let mut table = DynamicTable::new(64);
        table.insert(field("aaaa", "1111")); // 4+4+32 = 40
        table.insert(field("bbbb", "2222")); // evicts the first
        assert_eq!(table.find_name(b"aaaa"), None);
        assert_eq!(table.find_name(b"bbbb"), Some(0));
        assert!(table.size <= 64);
    }

    #[test]
    fn test_oversized_entry_clears_table() {
        let mut table = DynamicTable::new(40);
        table.insert(field("aa", "11"));
        table.insert(HeaderField::new(vec![b'x'; 100], vec![b'y'; 100]));
        assert!(table.entries.is_empty());
        assert_eq!(table.size, 0);
    }

    #[test]
    fn test_table_size_update_respected() {
        let mut decoder = HpackDecoder::new();
        // Update to 0 clears, then a literal still decodes.
        let mut input = vec![0x20];
        input.extend_from_slice(&[0x00, 0x02, b'a', b'b', 0x01, b'z']);
        let headers = decoder.decode(&input).unwrap();
        assert_eq!(headers, vec![field("ab", "z")]);
    }

    #[test]
    fn test_table_size_update_above_limit_rejected() {
        let mut decoder = HpackDecoder::new();
        decoder.set_max_table_size(100);
        // 0x3f + continuation encodes a large update
        let mut input = vec![0x3f];
        input.extend_from_slice(&[0xe1, 0x1f]); // 31 + 4065 = 4096
        assert!(matches!(
            decoder.decode(&input),
            Err(HpackError::TableSizeUpdateTooLarge { .. })
        ));
    }

    #[test]
    fn test_never_indexed_literal() {
        // 0x10 prefix with indexed name (:authority = index 1)
        let input = [0x11, 0x06, b's', b'e', b'c', b'r', b'e', b't'];
        let mut decoder = HpackDecoder::new();
        let headers = decoder.decode(&input).unwrap();
        assert_eq!(headers, vec![field(":authority", "secret")]);
        // Never-indexed literals do not enter the dynamic table.
        assert_eq!(decoder.decode(&[0xbe]), Err(HpackError::InvalidIndex(62)));
    }

    #[test]
    fn test_truncated_literal_rejected() {
        let input = [0x40, 0x0a, b'c', b'u'];
        let mut decoder = HpackDecoder::new();
        assert_eq!(decoder.decode(&input), Err(HpackError::UnexpectedEof));
    }
}
