//! gRPC message framing.
//!
//! Each message travels as `[flag:u8][length:u32 BE][payload]`. The
//! flag byte is 0 for uncompressed payloads, the only kind this client
//! sends.

use bytes::{BufMut, Bytes, BytesMut};

use crate::status::Status;

/// Length of the per-message prefix.
pub const MESSAGE_HEADER_SIZE: usize = 5;

/// Upper bound on a single decoded message (4 MiB).
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Prefix `payload` with the gRPC message header.
pub fn encode_message(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(MESSAGE_HEADER_SIZE + payload.len());
    buf.put_u8(0);
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(payload);
    buf.freeze()
}

/// Strip the message header from a response body and return the
/// payload.
pub fn decode_message(body: &Bytes) -> Result<Bytes, Status> {
    if body.len() < MESSAGE_HEADER_SIZE {
        return Err(Status::internal("invalid gRPC response format"));
    }
    let compressed = body[0] != 0;
    let len = u32::from_be_bytes([body[1], body[2], body[3], body[4]]) as usize;
    if compressed {
        return Err(Status::internal("compressed responses are not supported"));
    }
    if len > MAX_MESSAGE_SIZE {
        return Err(Status::internal(format!(
            "message of {} bytes exceeds limit",
            len
        )));
    }
    if body.len() < MESSAGE_HEADER_SIZE + len {
        return Err(Status::internal("truncated gRPC response"));
    }
    Ok(body.slice(MESSAGE_HEADER_SIZE..MESSAGE_HEADER_SIZE + len))
}
