//! HTTP/2 frame encoding and decoding (RFC 7540 Sections 4 and 6).
//!
//! Every frame starts with a fixed 9-byte header:
//!
//! ```text
//! +-----------------------------------------------+
//! |                 Length (24)                   |
//! +---------------+---------------+---------------+
//! |   Type (8)    |   Flags (8)   |
//! +-+-------------+---------------+---------------+
//! |R|                 Stream Identifier (31)      |
//! +-+---------------------------------------------+
//! |                   Frame Payload ...           |
//! +-----------------------------------------------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

/// Size of the fixed frame header.
pub const FRAME_HEADER_SIZE: usize = 9;

/// The client connection preface (RFC 7540 Section 3.5).
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Default SETTINGS_MAX_FRAME_SIZE.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;

/// Default SETTINGS_INITIAL_WINDOW_SIZE.
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65_535;

/// Default SETTINGS_HEADER_TABLE_SIZE.
pub const DEFAULT_HEADER_TABLE_SIZE: u32 = 4_096;

/// Frame flag bits.
pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    pub const ACK: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// Frame type octets (RFC 7540 Section 6).
mod frame_type {
    pub const DATA: u8 = 0x0;
    pub const HEADERS: u8 = 0x1;
    pub const PRIORITY: u8 = 0x2;
    pub const RST_STREAM: u8 = 0x3;
    pub const SETTINGS: u8 = 0x4;
    pub const PUSH_PROMISE: u8 = 0x5;
    pub const PING: u8 = 0x6;
    pub const GOAWAY: u8 = 0x7;
    pub const WINDOW_UPDATE: u8 = 0x8;
    pub const CONTINUATION: u8 = 0x9;
}

/// Stream identifier (31 bits, high bit reserved).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct StreamId(u32);

impl StreamId {
    /// The connection-level stream (stream 0).
    pub const CONNECTION: StreamId = StreamId(0);

    /// Create a stream ID, masking the reserved bit.
    #[inline]
    pub fn new(id: u32) -> Self {
        StreamId(id & 0x7fff_ffff)
    }

    /// Raw stream ID value.
    #[inline]
    pub fn value(self) -> u32 {
        self.0
    }

    /// Whether this is the connection-level stream.
    #[inline]
    pub fn is_connection(self) -> bool {
        self.0 == 0
    }

    /// Whether this is a client-initiated stream (odd IDs).
    #[inline]
    pub fn is_client_initiated(self) -> bool {
        self.0 % 2 == 1
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// HTTP/2 error codes (RFC 7540 Section 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    NoError = 0x0,
    ProtocolError = 0x1,
    InternalError = 0x2,
    FlowControlError = 0x3,
    SettingsTimeout = 0x4,
    StreamClosed = 0x5,
    FrameSizeError = 0x6,
    RefusedStream = 0x7,
    Cancel = 0x8,
    CompressionError = 0x9,
    ConnectError = 0xa,
    EnhanceYourCalm = 0xb,
    InadequateSecurity = 0xc,
    Http11Required = 0xd,
}

impl ErrorCode {
    pub fn from_u32(code: u32) -> Self {
        match code {
            0x0 => ErrorCode::NoError,
            0x1 => ErrorCode::ProtocolError,
            0x3 => ErrorCode::FlowControlError,
            0x4 => ErrorCode::SettingsTimeout,
            0x5 => ErrorCode::StreamClosed,
            0x6 => ErrorCode::FrameSizeError,
            0x7 => ErrorCode::RefusedStream,
            0x8 => ErrorCode::Cancel,
            0x9 => ErrorCode::CompressionError,
            0xa => ErrorCode::ConnectError,
            0xb => ErrorCode::EnhanceYourCalm,
            0xc => ErrorCode::InadequateSecurity,
            0xd => ErrorCode::Http11Required,
            // Unknown codes are treated as INTERNAL_ERROR per RFC 7540.
            _ => ErrorCode::InternalError,
        }
    }

    pub fn to_u32(self) -> u32 {
        self as u32
    }
}

/// A single setting in a SETTINGS frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Setting {
    pub id: u16,
    pub value: u32,
}

/// Known setting identifiers (RFC 7540 Section 6.5.2).
pub mod setting_id {
    pub const HEADER_TABLE_SIZE: u16 = 0x1;
    pub const ENABLE_PUSH: u16 = 0x2;
    pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
    pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
    pub const MAX_FRAME_SIZE: u16 = 0x5;
    pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;
}

/// Stream priority information carried by HEADERS/PRIORITY frames.
#[derive(Debug, Clone, Copy)]
pub struct Priority {
    pub exclusive: bool,
    pub dependency: StreamId,
    pub weight: u8,
}

/// A parsed HTTP/2 frame.
#[derive(Debug, Clone)]
pub enum Frame {
    Data {
        stream_id: StreamId,
        data: Bytes,
        end_stream: bool,
    },
    Headers {
        stream_id: StreamId,
        header_block: Bytes,
        end_stream: bool,
        end_headers: bool,
        priority: Option<Priority>,
    },
    Priority {
        stream_id: StreamId,
        priority: Priority,
    },
    RstStream {
        stream_id: StreamId,
        error_code: u32,
    },
    Settings {
        ack: bool,
        settings: Vec<Setting>,
    },
    PushPromise {
        stream_id: StreamId,
        promised_stream_id: StreamId,
        header_block: Bytes,
        end_headers: bool,
    },
    Ping {
        ack: bool,
        data: [u8; 8],
    },
    GoAway {
        last_stream_id: StreamId,
        error_code: u32,
        debug_data: Bytes,
    },
    WindowUpdate {
        stream_id: StreamId,
        increment: u32,
    },
    Continuation {
        stream_id: StreamId,
        header_block: Bytes,
        end_headers: bool,
    },
    /// Unknown frame type, ignored per RFC 7540.
    Unknown {
        frame_type: u8,
        stream_id: StreamId,
        payload: Bytes,
    },
}

/// Frame parsing errors.
#[derive(Debug)]
pub enum FrameError {
    /// Frame exceeds the negotiated maximum size.
    FrameTooLarge { size: u32, max: u32 },
    /// Frame requires a non-zero stream ID but carried stream 0.
    StreamIdRequired { frame_type: u8 },
    /// Frame is restricted to stream 0 but carried a stream ID.
    StreamIdForbidden { frame_type: u8 },
    /// Payload length does not match what the frame type requires.
    InvalidPayloadLength { frame_type: u8, actual: usize },
    /// Padding length exceeds the payload.
    InvalidPadding,
    /// WINDOW_UPDATE with a zero increment.
    InvalidWindowIncrement,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::FrameTooLarge { size, max } => {
                write!(f, "frame of {} bytes exceeds maximum of {}", size, max)
            }
            FrameError::StreamIdRequired { frame_type } => {
                write!(f, "frame type {:#x} requires a stream ID", frame_type)
            }
            FrameError::StreamIdForbidden { frame_type } => {
                write!(f, "frame type {:#x} must use stream 0", frame_type)
            }
            FrameError::InvalidPayloadLength { frame_type, actual } => {
                write!(
                    f,
                    "invalid payload length {} for frame type {:#x}",
                    actual, frame_type
                )
            }
            FrameError::InvalidPadding => write!(f, "padding exceeds payload"),
            FrameError::InvalidWindowIncrement => write!(f, "zero window increment"),
        }
    }
}

impl std::error::Error for FrameError {}

/// Encodes frames into a write buffer, honoring the peer's max frame size.
pub struct FrameEncoder {
    max_frame_size: u32,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn set_max_frame_size(&mut self, size: u32) {
        self.max_frame_size = size;
    }

    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    /// Encode one frame (header + payload) into `buf`.
    pub fn encode(&self, frame: &Frame, buf: &mut BytesMut) {
        match frame {
            Frame::Data {
                stream_id,
                data,
                end_stream,
            } => {
                let fl = if *end_stream { flags::END_STREAM } else { 0 };
                write_header(buf, data.len() as u32, frame_type::DATA, fl, *stream_id);
                buf.extend_from_slice(data);
            }
            Frame::Headers {
                stream_id,
                header_block,
                end_stream,
                end_headers,
                priority,
            } => {
                let mut fl = 0u8;
                if *end_stream {
                    fl |= flags::END_STREAM;
                }
                if *end_headers {
                    fl |= flags::END_HEADERS;
                }
                let extra = if priority.is_some() { 5 } else { 0 };
                if priority.is_some() {
                    fl |= flags::PRIORITY;
                }
                let len = header_block.len() as u32 + extra;
                write_header(buf, len, frame_type::HEADERS, fl, *stream_id);
                if let Some(p) = priority {
                    write_priority(buf, p);
                }
                buf.extend_from_slice(header_block);
            }
            Frame::Priority {
                stream_id,
                priority,
            } => {
                write_header(buf, 5, frame_type::PRIORITY, 0, *stream_id);
                write_priority(buf, priority);
            }
            Frame::RstStream {
                stream_id,
                error_code,
            } => {
                write_header(buf, 4, frame_type::RST_STREAM, 0, *stream_id);
                buf.put_u32(*error_code);
            }
            Frame::Settings { ack, settings } => {
                let fl = if *ack { flags::ACK } else { 0 };
                write_header(
                    buf,
                    (settings.len() * 6) as u32,
                    frame_type::SETTINGS,
                    fl,
                    StreamId::CONNECTION,
                );
                for s in settings {
                    buf.put_u16(s.id);
                    buf.put_u32(s.value);
                }
            }
            Frame::PushPromise {
                stream_id,
                promised_stream_id,
                header_block,
                end_headers,
            } => {
                let fl = if *end_headers { flags::END_HEADERS } else { 0 };
                let len = 4 + header_block.len() as u32;
                write_header(buf, len, frame_type::PUSH_PROMISE, fl, *stream_id);
                buf.put_u32(promised_stream_id.value());
                buf.extend_from_slice(header_block);
            }
            Frame::Ping { ack, data } => {
                let fl = if *ack { flags::ACK } else { 0 };
                write_header(buf, 8, frame_type::PING, fl, StreamId::CONNECTION);
                buf.extend_from_slice(data);
            }
            Frame::GoAway {
                last_stream_id,
                error_code,
                debug_data,
            } => {
                let len = 8 + debug_data.len() as u32;
                write_header(buf, len, frame_type::GOAWAY, 0, StreamId::CONNECTION);
                buf.put_u32(last_stream_id.value());
                buf.put_u32(*error_code);
                buf.extend_from_slice(debug_data);
            }
            Frame::WindowUpdate {
                stream_id,
                increment,
            } => {
                write_header(buf, 4, frame_type::WINDOW_UPDATE, 0, *stream_id);
                buf.put_u32(increment & 0x7fff_ffff);
            }
            Frame::Continuation {
                stream_id,
                header_block,
                end_headers,
            } => {
                let fl = if *end_headers { flags::END_HEADERS } else { 0 };
                write_header(
                    buf,
                    header_block.len() as u32,
                    frame_type::CONTINUATION,
                    fl,
                    *stream_id,
                );
                buf.extend_from_slice(header_block);
            }
            Frame::Unknown {
                frame_type: ft,
                stream_id,
                payload,
            } => {
                write_header(buf, payload.len() as u32, *ft, 0, *stream_id);
                buf.extend_from_slice(payload);
            }
        }
    }
}

fn write_header(buf: &mut BytesMut, length: u32, frame_type: u8, flags: u8, stream_id: StreamId) {
    buf.reserve(FRAME_HEADER_SIZE + length as usize);
    buf.put_u8((length >> 16) as u8);
    buf.put_u8((length >> 8) as u8);
    buf.put_u8(length as u8);
    buf.put_u8(frame_type);
    buf.put_u8(flags);
    buf.put_u32(stream_id.value());
}

fn write_priority(buf: &mut BytesMut, p: &Priority) {
    let mut dep = p.dependency.value();
    if p.exclusive {
        dep |= 0x8000_0000;
    }
    buf.put_u32(dep);
    buf.put_u8(p.weight);
}

/// Parses frames out of a receive buffer.
pub struct FrameDecoder {
    max_frame_size: u32,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn set_max_frame_size(&mut self, size: u32) {
        self.max_frame_size = size;
    }

    /// Try to decode one complete frame from `buf`.
    ///
    /// Returns `Ok(None)` when more data is needed. On success the
    /// consumed bytes are removed from the buffer.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let length = ((buf[0] as u32) << 16) | ((buf[1] as u32) << 8) | (buf[2] as u32);
        let ftype = buf[3];
        let fl = buf[4];
        let stream_id = StreamId::new(
            ((buf[5] as u32) << 24)
                | ((buf[6] as u32) << 16)
                | ((buf[7] as u32) << 8)
                | (buf[8] as u32),
        );

        if length > self.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size: length,
                max: self.max_frame_size,
            });
        }

        if buf.len() < FRAME_HEADER_SIZE + length as usize {
            return Ok(None);
        }

        buf.advance(FRAME_HEADER_SIZE);
        let payload = buf.split_to(length as usize).freeze();

        let frame = match ftype {
            frame_type::DATA => parse_data(stream_id, fl, payload)?,
            frame_type::HEADERS => parse_headers(stream_id, fl, payload)?,
            frame_type::PRIORITY => parse_priority(stream_id, payload)?,
            frame_type::RST_STREAM => parse_rst_stream(stream_id, payload)?,
            frame_type::SETTINGS => parse_settings(stream_id, fl, payload)?,
            frame_type::PUSH_PROMISE => parse_push_promise(stream_id, fl, payload)?,
            frame_type::PING => parse_ping(stream_id, fl, payload)?,
            frame_type::GOAWAY => parse_goaway(stream_id, payload)?,
            frame_type::WINDOW_UPDATE => parse_window_update(stream_id, payload)?,
            frame_type::CONTINUATION => Frame::Continuation {
                stream_id,
                header_block: payload,
                end_headers: fl & flags::END_HEADERS != 0,
            },
            _ => Frame::Unknown {
                frame_type: ftype,
                stream_id,
                payload,
            },
        };

        Ok(Some(frame))
    }
}

/// Strip the pad-length octet and trailing padding from a padded payload.
fn strip_padding(payload: Bytes) -> Result<Bytes, FrameError> {
    if payload.is_empty() {
        return Err(FrameError::InvalidPadding);
    }
    let pad_len = payload[0] as usize;
    let body_len = payload.len() - 1;
    if pad_len > body_len {
        return Err(FrameError::InvalidPadding);
    }
    Ok(payload.slice(1..1 + (body_len - pad_len)))
}

fn parse_data(stream_id: StreamId, fl: u8, payload: Bytes) -> Result<Frame, FrameError> {
    if stream_id.is_connection() {
        return Err(FrameError::StreamIdRequired {
            frame_type: frame_type::DATA,
        });
    }
    let data = if fl & flags::PADDED != 0 {
        strip_padding(payload)?
    } else {
        payload
    };
    Ok(Frame::Data {
        stream_id,
        data,
        end_stream: fl & flags::END_STREAM != 0,
    })
}

fn parse_headers(stream_id: StreamId, fl: u8, payload: Bytes) -> Result<Frame, FrameError> {
    if stream_id.is_connection() {
        return Err(FrameError::StreamIdRequired {
            frame_type: frame_type::HEADERS,
        });
    }
    let mut payload = if fl & flags::PADDED != 0 {
        strip_padding(payload)?
    } else {
        payload
    };

    let priority = if fl & flags::PRIORITY != 0 {
        if payload.len() < 5 {
            return Err(FrameError::InvalidPayloadLength {
                frame_type: frame_type::HEADERS,
                actual: payload.len(),
            });
        }
        let dep = payload.get_u32();
        let weight = payload.get_u8();
        Some(Priority {
            exclusive: dep & 0x8000_0000 != 0,
            dependency: StreamId::new(dep),
            weight,
        })
    } else {
        None
    };

    Ok(Frame::Headers {
        stream_id,
        header_block: payload,
        end_stream: fl & flags::END_STREAM != 0,
        end_headers: fl & flags::END_HEADERS != 0,
        priority,
    })
}

fn parse_priority(stream_id: StreamId, mut payload: Bytes) -> Result<Frame, FrameError> {
    if payload.len() != 5 {
        return Err(FrameError::InvalidPayloadLength {
            frame_type: frame_type::PRIORITY,
            actual: payload.len(),
        });
    }
    let dep = payload.get_u32();
    let weight = payload.get_u8();
    Ok(Frame::Priority {
        stream_id,
        priority: Priority {
            exclusive: dep & 0x8000_0000 != 0,
            dependency: StreamId::new(dep),
            weight,
        },
    })
}

fn parse_rst_stream(stream_id: StreamId, mut payload: Bytes) -> Result<Frame, FrameError> {
    if payload.len() != 4 {
        return Err(FrameError::InvalidPayloadLength {
            frame_type: frame_type::RST_STREAM,
            actual: payload.len(),
        });
    }
    if stream_id.is_connection() {
        return Err(FrameError::StreamIdRequired {
            frame_type: frame_type::RST_STREAM,
        });
    }
    Ok(Frame::RstStream {
        stream_id,
        error_code: payload.get_u32(),
    })
}

fn parse_settings(stream_id: StreamId, fl: u8, mut payload: Bytes) -> Result<Frame, FrameError> {
    if !stream_id.is_connection() {
        return Err(FrameError::StreamIdForbidden {
            frame_type: frame_type::SETTINGS,
        });
    }
    if payload.len() % 6 != 0 {
        return Err(FrameError::InvalidPayloadLength {
            frame_type: frame_type::SETTINGS,
            actual: payload.len(),
        });
    }
    let mut settings = Vec::with_capacity(payload.len() / 6);
    while payload.has_remaining() {
        settings.push(Setting {
            id: payload.get_u16(),
            value: payload.get_u32(),
        });
    }
    Ok(Frame::Settings {
        ack: fl & flags::ACK != 0,
        settings,
    })
}

fn parse_push_promise(stream_id: StreamId, fl: u8, payload: Bytes) -> Result<Frame, FrameError> {
    let mut payload = if fl & flags::PADDED != 0 {
        strip_padding(payload)?
    } else {
        payload
    };
    if payload.len() < 4 {
        return Err(FrameError::InvalidPayloadLength {
            frame_type: frame_type::PUSH_PROMISE,
            actual: payload.len(),
        });
    }
    let promised = StreamId::new(payload.get_u32());
    Ok(Frame::PushPromise {
        stream_id,
        promised_stream_id: promised,
        header_block: payload,
        end_headers: fl & flags::END_HEADERS != 0,
    })
}

fn parse_ping(stream_id: StreamId, fl: u8, payload: Bytes) -> Result<Frame, FrameError> {
    if !stream_id.is_connection() {
        return Err(FrameError::StreamIdForbidden {
            frame_type: frame_type::PING,
        });
    }
    if payload.len() != 8 {
        return Err(FrameError::InvalidPayloadLength {
            frame_type: frame_type::PING,
            actual: payload.len(),
        });
    }
    let mut data = [0u8; 8];
    data.copy_from_slice(&payload);
    Ok(Frame::Ping {
        ack: fl & flags::ACK != 0,
        data,
    })
}

fn parse_goaway(stream_id: StreamId, mut payload: Bytes) -> Result<Frame, FrameError> {
    if !stream_id.is_connection() {
        return Err(FrameError::StreamIdForbidden {
            frame_type: frame_type::GOAWAY,
        });
    }
    if payload.len() < 8 {
        return Err(FrameError::InvalidPayloadLength {
            frame_type: frame_type::GOAWAY,
            actual: payload.len(),
        });
    }
    let last = StreamId::new(payload.get_u32());
    let error_code = payload.get_u32();
    Ok(Frame::GoAway {
        last_stream_id: last,
        error_code,
        debug_data: payload,
    })
}

fn parse_window_update(stream_id: StreamId, mut payload: Bytes) -> Result<Frame, FrameError> {
    if payload.len() != 4 {
        return Err(FrameError::InvalidPayloadLength {
            frame_type: frame_type::WINDOW_UPDATE,
            actual: payload.len(),
        });
    }
    let increment = payload.get_u32() & 0x7fff_ffff;
    if increment == 0 {
        return Err(FrameError::InvalidWindowIncrement);
    }
    Ok(Frame::WindowUpdate {
        stream_id,
        increment,
    })
}
