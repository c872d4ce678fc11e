//! Byte transport abstraction.
//!
//! The connection engine never touches a socket. It talks to a
//! `Transport`: raw socket bytes go in through `on_recv`, application
//! bytes come back out of `recv`, and whatever the transport wants
//! written to the socket is exposed through `pending_send`. The TLS
//! implementation encrypts and decrypts inside that seam; the plain
//! implementation just buffers.

use bytes::BytesMut;
use std::io;

/// Lifecycle of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Performing a handshake (TLS only).
    Handshaking,
    /// Ready for application data.
    Ready,
    /// A fatal error occurred.
    Error,
    /// Shut down.
    Closed,
}

/// Object-safe transport seam between socket I/O and the protocol
/// engine. The session layer selects plain or TLS at run time through
/// `Box<dyn Transport>`.
pub trait Transport: Send {
    /// Current state.
    fn state(&self) -> TransportState;

    /// Whether application data may flow.
    fn is_ready(&self) -> bool {
        self.state() == TransportState::Ready
    }

    /// Queue application bytes for the peer.
    fn send(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Read application bytes received from the peer.
    ///
    /// Returns `WouldBlock` when nothing is buffered.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Feed raw bytes read off the socket.
    fn on_recv(&mut self, data: &[u8]) -> io::Result<()>;

    /// Bytes that must be written to the socket next.
    fn pending_send(&self) -> &[u8];

    /// Mark `n` bytes of `pending_send` as written.
    fn advance_send(&mut self, n: usize);

    fn has_pending_send(&self) -> bool {
        !self.pending_send().is_empty()
    }

    /// Begin an orderly shutdown. For TLS this queues close_notify.
    fn shutdown(&mut self) -> io::Result<()>;
}

impl Transport for Box<dyn Transport> {
    fn state(&self) -> TransportState {
        (**self).state()
    }

    fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        (**self).send(data)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).recv(buf)
    }

    fn on_recv(&mut self, data: &[u8]) -> io::Result<()> {
        (**self).on_recv(data)
    }

    fn pending_send(&self) -> &[u8] {
        (**self).pending_send()
    }

    fn advance_send(&mut self, n: usize) {
        (**self).advance_send(n)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        (**self).shutdown()
    }
}

/// Cleartext transport. Used for h2c targets and for in-memory tests.
///
/// Both directions are plain pass-through buffers: `send` appends to
/// the outbound buffer and `advance_send` consumes it from the front
/// once the socket has taken the bytes.
pub struct PlainTransport {
    state: TransportState,
    recv_buf: BytesMut,
    send_buf: BytesMut,
}

impl PlainTransport {
    pub fn new() -> Self {
        Self {
            // No handshake; usable immediately.
            state: TransportState::Ready,
            recv_buf: BytesMut::with_capacity(16_384),
            send_buf: BytesMut::with_capacity(16_384),
        }
    }
}

impl Default for PlainTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for PlainTransport {
    fn state(&self) -> TransportState {
        self.state
    }

    fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.state != TransportState::Ready {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "transport not ready",
            ));
        }
        self.send_buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.state != TransportState::Ready {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "transport not ready",
            ));
        }
        if self.recv_buf.is_empty() {
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }
        let n = buf.len().min(self.recv_buf.len());
        buf[..n].copy_from_slice(&self.recv_buf[..n]);
        let _ = self.recv_buf.split_to(n);
        Ok(n)
    }

    fn on_recv(&mut self, data: &[u8]) -> io::Result<()> {
        self.recv_buf.extend_from_slice(data);
        Ok(())
    }

    fn pending_send(&self) -> &[u8] {
        &self.send_buf
    }

    fn advance_send(&mut self, n: usize) {
        let n = n.min(self.send_buf.len());
        let _ = self.send_buf.split_to(n);
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.state = TransportState::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_is_immediately_ready() {
        let t = PlainTransport::new();
        assert!(t.is_ready());
    }

    #[test]
    fn test_send_appears_in_pending() {
        let mut t = PlainTransport::new();
        t.send(b"hello").unwrap();
        t.send(b" world").unwrap();
        assert_eq!(t.pending_send(), b"hello world");
    }

    #[test]
    fn test_advance_send_partial_then_complete() {
        let mut t = PlainTransport::new();
        t.send(b"abcdef").unwrap();
        t.advance_send(4);
        assert_eq!(t.pending_send(), b"ef");
        t.advance_send(2);
        assert!(!t.has_pending_send());
    }

    #[test]
    fn test_send_after_partial_advance_appends() {
        let mut t = PlainTransport::new();
        t.send(b"first").unwrap();
        t.advance_send(3);
        t.send(b"second").unwrap();
        assert_eq!(t.pending_send(), b"stsecond");
        t.advance_send(t.pending_send().len());
        assert!(!t.has_pending_send());
    }

    #[test]
    fn test_recv_round_trip() {
        let mut t = PlainTransport::new();
        t.on_recv(b"response bytes").unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(t.recv(&mut buf).unwrap(), 8);
        assert_eq!(&buf, b"response");
        let mut rest = [0u8; 32];
        let n = t.recv(&mut rest).unwrap();
        assert_eq!(&rest[..n], b" bytes");
    }

    #[test]
    fn test_recv_empty_would_block() {
        let mut t = PlainTransport::new();
        let mut buf = [0u8; 8];
        let err = t.recv(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_send_after_shutdown_fails() {
        let mut t = PlainTransport::new();
        t.shutdown().unwrap();
        assert_eq!(t.state(), TransportState::Closed);
        assert!(t.send(b"x").is_err());
    }

    #[test]
    fn test_boxed_transport_delegates() {
        let mut t: Box<dyn Transport> = Box::new(PlainTransport::new());
        t.send(b"via box").unwrap();
        assert_eq!(t.pending_send(), b"via box");
    }
}
