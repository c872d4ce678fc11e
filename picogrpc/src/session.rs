//! Blocking HTTP/2 session driver.
//!
//! Owns the TCP socket and the protocol engine, and runs the
//! readiness-driven exchange loop for one call at a time: write
//! everything the engine has queued, then block on the socket with a
//! read timeout derived from the call deadline, feed what arrives back
//! into the engine, and fold the resulting events into the response.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use picogrpc_h2::connection::{Connection, ConnectionEvent, ConnectionState};
use picogrpc_h2::frame::{ErrorCode, StreamId};
use picogrpc_h2::hpack::HeaderField;
use picogrpc_h2::transport::{PlainTransport, Transport};
#[cfg(feature = "tls")]
use picogrpc_h2::tls::{TlsConfig, TlsTransport};

use crate::status::{Status, StatusCode};

/// Time allowed for TCP connect plus the HTTP/2 (and TLS) handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

const READ_CHUNK: usize = 16_384;

/// One HTTP-level response: status, merged headers and trailers, body.
#[derive(Debug)]
pub struct Http2Response {
    pub status_code: u32,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Http2Response {
    /// First value for a header or trailer name (names are stored
    /// lower-cased as HTTP/2 requires).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Response accumulation phases for the in-flight call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallPhase {
    /// Waiting for the initial header block.
    Headers,
    /// Initial headers seen; collecting DATA.
    Data,
    /// Stream finished; response complete.
    Closed,
}

/// An established connection to one server.
pub struct WireSession {
    socket: TcpStream,
    conn: Connection<Box<dyn Transport>>,
}

impl WireSession {
    /// Connect, optionally wrap in TLS, and complete the HTTP/2
    /// settings exchange.
    pub fn establish(
        host: &str,
        port: u16,
        #[cfg(feature = "tls")] tls: Option<&TlsConfig>,
    ) -> Result<Self, Status> {
        let deadline = Instant::now() + HANDSHAKE_TIMEOUT;

        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| Status::unavailable(format!("failed to resolve {}: {}", host, e)))?;
        let mut socket = None;
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, HANDSHAKE_TIMEOUT) {
                Ok(s) => {
                    socket = Some(s);
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }
        let socket = socket.ok_or_else(|| {
            Status::unavailable(format!(
                "failed to connect to {}:{}: {}",
                host,
                port,
                last_err
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no addresses".to_string())
            ))
        })?;
        socket
            .set_nodelay(true)
            .map_err(|e| Status::internal(format!("socket setup failed: {}", e)))?;

        #[cfg(feature = "tls")]
        let transport: Box<dyn Transport> = match tls {
            Some(config) => Box::new(
                TlsTransport::new(config, host)
                    .map_err(|e| Status::internal(format!("TLS setup failed: {}", e)))?,
            ),
            None => Box::new(PlainTransport::new()),
        };
        #[cfg(not(feature = "tls"))]
        let transport: Box<dyn Transport> = Box::new(PlainTransport::new());

        let mut session = Self {
            socket,
            conn: Connection::new(transport),
        };

        session
            .conn
            .on_transport_ready()
            .map_err(|e| Status::internal(format!("HTTP/2 setup failed: {}", e)))?;

        // Drive I/O until the settings exchange completes.
        while !session.conn.is_ready() {
            let mut error: Option<String> = None;
            session
                .drive(Some(deadline), |event| match event {
                    ConnectionEvent::Ready => true,
                    ConnectionEvent::Error(e) => {
                        error = Some(e.to_string());
                        true
                    }
                    _ => false,
                })
                .map_err(|s| match s.code() {
                    StatusCode::DeadlineExceeded => {
                        Status::unavailable("timed out waiting for connection handshake")
                    }
                    _ => s,
                })?;
            if let Some(msg) = error {
                return Err(Status::internal(format!("HTTP/2 handshake failed: {}", msg)));
            }
        }

        tracing::debug!(host, port, "session established");
        Ok(session)
    }

    /// Whether the connection can still start requests.
    pub fn is_open(&self) -> bool {
        self.conn.is_ready()
    }

    /// Run one unary exchange: send the header block and framed body,
    /// then block until the response stream finishes or the deadline
    /// lapses.
    pub fn execute(
        &mut self,
        headers: &[HeaderField],
        body: &[u8],
        deadline: Option<Instant>,
    ) -> Result<Http2Response, Status> {
        if !self.conn.is_ready() {
            return Err(Status::unavailable("connection is not open"));
        }

        let stream_id = self
            .conn
            .start_request(headers, false)
            .map_err(|e| Status::internal(format!("failed to start request: {}", e)))?;

        let result = self.run_exchange(stream_id, body, deadline);
        self.conn.release_stream(stream_id);

        if result.is_err() && self.conn.state() == ConnectionState::Open {
            // Tell the server to stop work on an abandoned call.
            let _ = self.conn.reset_stream(stream_id, ErrorCode::Cancel);
            let _ = self.pump_writes();
        }
        result
    }

    fn run_exchange(
        &mut self,
        stream_id: StreamId,
        body: &[u8],
        deadline: Option<Instant>,
    ) -> Result<Http2Response, Status> {
        let mut sent = 0usize;
        let mut phase = CallPhase::Headers;
        let mut status_code: Option<u32> = None;
        let mut headers: Vec<(String, String)> = Vec::new();
        let mut response_body = BytesMut::new();
        let mut reset: Option<ErrorCode> = None;
        let mut goaway = false;
        let mut fatal: Option<String> = None;

        // The whole body usually fits the initial 64 KiB window; the
        // loop below resumes sending when WINDOW_UPDATE arrives.
        sent += self.send_body(stream_id, body, sent)?;

        while phase != CallPhase::Closed {
            if let Some(msg) = fatal.take() {
                return Err(Status::internal(msg));
            }
            if let Some(code) = reset.take() {
                return Err(map_reset(code));
            }
            if goaway {
                return Err(Status::unavailable("server closed the connection"));
            }

            self.drive(deadline, |event| match event {
                ConnectionEvent::Headers {
                    stream_id: sid,
                    headers: fields,
                    end_stream,
                } => {
                    if *sid != stream_id {
                        return false;
                    }
                    for field in fields {
                        let name = String::from_utf8_lossy(&field.name).into_owned();
                        let value = String::from_utf8_lossy(&field.value).into_owned();
                        if name == ":status" {
                            status_code = value.parse().ok();
                        } else {
                            headers.push((name, value));
                        }
                    }
                    phase = if *end_stream {
                        CallPhase::Closed
                    } else {
                        CallPhase::Data
                    };
                    true
                }
                ConnectionEvent::Data {
                    stream_id: sid,
                    data,
                    end_stream,
                } => {
                    if *sid != stream_id {
                        return false;
                    }
                    response_body.extend_from_slice(data);
                    if *end_stream {
                        phase = CallPhase::Closed;
                    }
                    true
                }
                ConnectionEvent::StreamReset {
                    stream_id: sid,
                    error_code,
                } => {
                    if *sid == stream_id {
                        reset = Some(*error_code);
                        true
                    } else {
                        false
                    }
                }
                ConnectionEvent::GoAway { .. } => {
                    goaway = true;
                    true
                }
                ConnectionEvent::Error(e) => {
                    fatal = Some(e.to_string());
                    true
                }
                ConnectionEvent::Ready => false,
            })?;

            // A window update may have arrived; push out more body.
            if sent < body.len() {
                sent += self.send_body(stream_id, body, sent)?;
            }
        }

        if let Some(msg) = fatal.take() {
            return Err(Status::internal(msg));
        }
        if let Some(code) = reset.take() {
            return Err(map_reset(code));
        }

        Ok(Http2Response {
            status_code: status_code.unwrap_or(0),
            headers,
            body: response_body.freeze(),
        })
    }

    /// Send as much of the remaining body as flow control allows.
    fn send_body(
        &mut self,
        stream_id: StreamId,
        body: &[u8],
        offset: usize,
    ) -> Result<usize, Status> {
        let mut sent = 0;
        while offset + sent < body.len() || (body.is_empty() && sent == 0) {
            match self
                .conn
                .send_data(stream_id, &body[offset + sent..], true)
            {
                Ok(n) => {
                    sent += n;
                    if body.is_empty() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    return Err(Status::internal(format!("failed to send request: {}", e)))
                }
            }
        }
        self.pump_writes()
            .map_err(|e| Status::unavailable(format!("connection write failed: {}", e)))?;
        Ok(sent)
    }

    /// One iteration of the readiness loop: flush writes, block for
    /// bytes until the deadline, feed them to the engine, and offer
    /// every produced event to `on_event`.
    fn drive(
        &mut self,
        deadline: Option<Instant>,
        mut on_event: impl FnMut(&ConnectionEvent) -> bool,
    ) -> Result<(), Status> {
        self.pump_writes()
            .map_err(|e| Status::unavailable(format!("connection write failed: {}", e)))?;

        let timeout = match deadline {
            Some(d) => {
                let remaining = d.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(Status::deadline_exceeded("deadline exceeded"));
                }
                Some(remaining)
            }
            None => None,
        };
        self.socket
            .set_read_timeout(timeout)
            .map_err(|e| Status::internal(format!("socket setup failed: {}", e)))?;

        let mut buf = [0u8; READ_CHUNK];
        match self.socket.read(&mut buf) {
            Ok(0) => return Err(Status::unavailable("connection closed by peer")),
            Ok(n) => {
                self.conn
                    .on_recv(&buf[..n])
                    .map_err(|e| Status::internal(format!("protocol error: {}", e)))?;
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                return Err(Status::deadline_exceeded("deadline exceeded"));
            }
            Err(e) => {
                return Err(Status::unavailable(format!("connection read failed: {}", e)))
            }
        }

        for event in self.conn.poll_events() {
            let consumed = on_event(&event);
            if !consumed {
                tracing::trace!(?event, "event ignored by current call");
            }
        }

        // Events may have queued responses (SETTINGS ACK, PING ACK).
        self.pump_writes()
            .map_err(|e| Status::unavailable(format!("connection write failed: {}", e)))?;
        Ok(())
    }

    fn pump_writes(&mut self) -> std::io::Result<()> {
        loop {
            let pending = self.conn.pending_send();
            if pending.is_empty() {
                return Ok(());
            }
            let n = self.socket.write(pending)?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "socket closed",
                ));
            }
            self.conn.advance_send(n);
        }
    }

    /// Orderly shutdown: GOAWAY, TLS close_notify, then the socket.
    pub fn close(&mut self) {
        if self.conn.close().is_ok() {
            let _ = self.pump_writes();
        }
        let _ = self.socket.shutdown(std::net::Shutdown::Both);
        tracing::debug!("session closed");
    }
}

fn map_reset(code: ErrorCode) -> Status {
    match code {
        ErrorCode::Cancel => Status::cancelled("stream cancelled by server"),
        ErrorCode::RefusedStream => Status::unavailable("stream refused by server"),
        ErrorCode::EnhanceYourCalm => {
            Status::new(StatusCode::ResourceExhausted, "server overloaded")
        }
        other => Status::internal(format!("stream reset: {:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_header_lookup() {
        let response = Http2Response {
            status_code: 200,
            headers: vec![
                ("content-type".to_string(), "application/grpc+proto".to_string()),
                ("grpc-status".to_string(), "0".to_string()),
            ],
            body: Bytes::new(),
        };
        assert_eq!(response.header("grpc-status"), Some("0"));
        assert_eq!(response.header("missing"), None);
    }

    #[test]
    fn test_reset_code_mapping() {
        assert_eq!(
            map_reset(ErrorCode::Cancel).code(),
            StatusCode::Cancelled
        );
        assert_eq!(
            map_reset(ErrorCode::RefusedStream).code(),
            StatusCode::Unavailable
        );
        assert_eq!(
            map_reset(ErrorCode::ProtocolError).code(),
            StatusCode::Internal
        );
    }
}
