//! Per-stream state tracking (RFC 7540 Section 5.1).

use crate::frame::StreamId;

/// Lifecycle of a single stream.
///
/// Client streams skip Idle in practice: they are created Open (or
/// HalfClosedLocal when the request carries END_STREAM).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

/// Book-keeping for one stream: state plus both flow-control windows.
#[derive(Debug)]
pub struct Stream {
    pub id: StreamId,
    pub state: StreamState,
    /// How much the peer allows us to send on this stream.
    pub send_window: i64,
    /// How much we allow the peer to send on this stream.
    pub recv_window: i64,
}

impl Stream {
    pub fn new(id: StreamId, send_window: u32, recv_window: u32) -> Self {
        Self {
            id,
            state: StreamState::Open,
            send_window: send_window as i64,
            recv_window: recv_window as i64,
        }
    }

    /// Local endpoint finished sending (END_STREAM sent).
    pub fn close_local(&mut self) {
        self.state = match self.state {
            StreamState::Open => StreamState::HalfClosedLocal,
            StreamState::HalfClosedRemote => StreamState::Closed,
            s => s,
        };
    }

    /// Peer finished sending (END_STREAM received).
    pub fn close_remote(&mut self) {
        self.state = match self.state {
            StreamState::Open => StreamState::HalfClosedRemote,
            StreamState::HalfClosedLocal => StreamState::Closed,
            s => s,
        };
    }

    pub fn reset(&mut self) {
        self.state = StreamState::Closed;
    }

    pub fn is_closed(&self) -> bool {
        self.state == StreamState::Closed
    }

    /// Whether the local endpoint may still send DATA.
    pub fn can_send(&self) -> bool {
        matches!(self.state, StreamState::Open | StreamState::HalfClosedRemote)
    }

    /// Whether DATA from the peer is still expected.
    pub fn can_recv(&self) -> bool {
        matches!(self.state, StreamState::Open | StreamState::HalfClosedLocal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> Stream {
        Stream::new(StreamId::new(1), 65_535, 65_535)
    }

    #[test]
    fn test_full_lifecycle_local_first() {
        let mut s = stream();
        assert!(s.can_send());
        s.close_local();
        assert_eq!(s.state, StreamState::HalfClosedLocal);
        assert!(!s.can_send());
        assert!(s.can_recv());
        s.close_remote();
        assert!(s.is_closed());
    }

    #[test]
    fn test_full_lifecycle_remote_first() {
        let mut s = stream();
        s.close_remote();
        assert_eq!(s.state, StreamState::HalfClosedRemote);
        assert!(s.can_send());
        assert!(!s.can_recv());
        s.close_local();
        assert!(s.is_closed());
    }

    #[test]
    fn test_reset_closes_immediately() {
        let mut s = stream();
        s.reset();
        assert!(s.is_closed());
        assert!(!s.can_send());
        assert!(!s.can_recv());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut s = stream();
        s.close_local();
        s.close_local();
        assert_eq!(s.state, StreamState::HalfClosedLocal);
    }
}
