//! TLS transport backed by rustls.

use bytes::BytesMut;
use rustls::pki_types::{CertificateDer, ServerName};
use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::transport::{Transport, TransportState};

/// Client TLS configuration.
pub struct TlsConfig {
    config: Arc<rustls::ClientConfig>,
}

impl TlsConfig {
    /// Configuration trusting the bundled webpki roots, with ALPN `h2`.
    pub fn http2() -> io::Result<Self> {
        let roots =
            rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Self::build(roots)
    }

    /// Configuration trusting only the given PEM-encoded roots, with
    /// ALPN `h2`. Fails when the PEM contains no usable certificate.
    pub fn http2_with_roots(pem_root_certs: &str) -> io::Result<Self> {
        let certs: Vec<CertificateDer<'static>> =
            rustls_pemfile::certs(&mut pem_root_certs.as_bytes()).collect::<Result<_, _>>()?;
        if certs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no certificates in PEM root bundle",
            ));
        }
        let mut roots = rustls::RootCertStore::empty();
        let (added, _ignored) = roots.add_parsable_certificates(certs);
        if added == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no parsable certificates in PEM root bundle",
            ));
        }
        Self::build(roots)
    }

    fn build(roots: rustls::RootCertStore) -> io::Result<Self> {
        let mut config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        config.alpn_protocols = vec![b"h2".to_vec()];
        Ok(Self {
            config: Arc::new(config),
        })
    }
}

/// Transport that encrypts through a rustls `ClientConnection`.
///
/// Ciphertext from the socket is fed in with `on_recv`; plaintext comes
/// out of `recv`. Handshake records queue immediately at construction,
/// so the socket loop can start writing before any application data
/// exists.
pub struct TlsTransport {
    conn: rustls::ClientConnection,
    state: TransportState,
    incoming: BytesMut,
    outgoing: BytesMut,
    plaintext: BytesMut,
}

impl TlsTransport {
    pub fn new(config: &TlsConfig, server_name: &str) -> io::Result<Self> {
        let name = ServerName::try_from(server_name.to_string())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let conn =
            rustls::ClientConnection::new(config.config.clone(), name).map_err(io::Error::other)?;

        let mut transport = Self {
            conn,
            state: TransportState::Handshaking,
            incoming: BytesMut::with_capacity(16_384),
            outgoing: BytesMut::with_capacity(16_384),
            plaintext: BytesMut::with_capacity(16_384),
        };
        transport.drain_tls_writes()?;
        Ok(transport)
    }

    /// Negotiated ALPN protocol, available once the handshake finishes.
    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        self.conn.alpn_protocol()
    }

    /// Run the TLS state machine over whatever is buffered.
    ///
    /// `read_tls` may consume less than the full buffer when its
    /// deframer fills, so ingest and process alternate until no more
    /// ciphertext moves.
    fn process(&mut self) -> io::Result<()> {
        loop {
            if !self.incoming.is_empty() {
                let mut cursor = io::Cursor::new(&self.incoming[..]);
                match self.conn.read_tls(&mut cursor) {
                    Ok(0) => {}
                    Ok(n) => {
                        let _ = self.incoming.split_to(n);
                        self.advance_state()?;
                        continue;
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(e),
                }
            }
            break;
        }
        self.advance_state()
    }

    fn advance_state(&mut self) -> io::Result<()> {
        match self.conn.process_new_packets() {
            Ok(io_state) => {
                let readable = io_state.plaintext_bytes_to_read();
                if readable > 0 {
                    let mut buf = vec![0u8; readable];
                    let n = self.conn.reader().read(&mut buf)?;
                    self.plaintext.extend_from_slice(&buf[..n]);
                }
                if self.state == TransportState::Handshaking && !self.conn.is_handshaking() {
                    tracing::debug!(
                        alpn = ?self.conn.alpn_protocol().map(String::from_utf8_lossy),
                        "tls handshake complete"
                    );
                    self.state = TransportState::Ready;
                }
            }
            Err(e) => {
                self.state = TransportState::Error;
                return Err(io::Error::other(e));
            }
        }

        self.drain_tls_writes()
    }

    fn drain_tls_writes(&mut self) -> io::Result<()> {
        while self.conn.wants_write() {
            let mut buf = Vec::with_capacity(4_096);
            match self.conn.write_tls(&mut buf) {
                Ok(0) => break,
                Ok(_) => self.outgoing.extend_from_slice(&buf),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl Transport for TlsTransport {
    fn state(&self) -> TransportState {
        self.state
    }

    fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.state != TransportState::Ready {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "tls handshake not complete",
            ));
        }
        let n = self.conn.writer().write(data)?;
        self.drain_tls_writes()?;
        Ok(n)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.plaintext.is_empty() {
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }
        let n = buf.len().min(self.plaintext.len());
        buf[..n].copy_from_slice(&self.plaintext[..n]);
        let _ = self.plaintext.split_to(n);
        Ok(n)
    }

    fn on_recv(&mut self, data: &[u8]) -> io::Result<()> {
        self.incoming.extend_from_slice(data);
        self.process()
    }

    fn pending_send(&self) -> &[u8] {
        &self.outgoing
    }

    fn advance_send(&mut self, n: usize) {
        let n = n.min(self.outgoing.len());
        let _ = self.outgoing.split_to(n);
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.conn.send_close_notify();
        self.drain_tls_writes()?;
        self.state = TransportState::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_bytes_queue_at_construction() {
        let config = TlsConfig::http2().unwrap();
        let transport = TlsTransport::new(&config, "example.com").unwrap();
        assert_eq!(transport.state(), TransportState::Handshaking);
        // ClientHello is waiting for the socket.
        assert!(transport.has_pending_send());
    }

    #[test]
    fn test_send_before_handshake_rejected() {
        let config = TlsConfig::http2().unwrap();
        let mut transport = TlsTransport::new(&config, "example.com").unwrap();
        assert!(transport.send(b"too early").is_err());
    }

    #[test]
    fn test_invalid_server_name_rejected() {
        let config = TlsConfig::http2().unwrap();
        assert!(TlsTransport::new(&config, "bad name with spaces").is_err());
    }

    #[test]
    fn test_empty_pem_roots_rejected() {
        assert!(TlsConfig::http2_with_roots("").is_err());
        assert!(TlsConfig::http2_with_roots("not pem at all").is_err());
    }
}
