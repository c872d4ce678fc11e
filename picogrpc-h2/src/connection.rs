//! HTTP/2 client connection state machine.
//!
//! Drives one connection from preface through settings exchange into
//! the open state, dispatches inbound frames to events, and applies
//! flow control on both levels. The caller owns the socket: it feeds
//! received bytes in through `on_recv` and writes out whatever
//! `pending_send` exposes.

use std::collections::HashMap;
use std::io;

use bytes::{Bytes, BytesMut};

use crate::flow_control::FlowControl;
use crate::frame::{
    setting_id, ErrorCode, Frame, FrameDecoder, FrameEncoder, FrameError, StreamId,
    CONNECTION_PREFACE, DEFAULT_INITIAL_WINDOW_SIZE,
};
use crate::hpack::{HeaderField, HpackDecoder, HpackEncoder, HpackError};
use crate::settings::ConnectionSettings;
use crate::stream::Stream;
use crate::transport::Transport;

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport not ready yet; preface not sent.
    WaitingPreface,
    /// Preface and our SETTINGS sent; waiting for the server's SETTINGS.
    WaitingSettings,
    /// Settings exchanged; requests may start.
    Open,
    /// GOAWAY received; no new streams.
    Draining,
    Closed,
}

/// Events surfaced to the session layer.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// Settings exchange finished; requests may start.
    Ready,
    Headers {
        stream_id: StreamId,
        headers: Vec<HeaderField>,
        end_stream: bool,
    },
    Data {
        stream_id: StreamId,
        data: Bytes,
        end_stream: bool,
    },
    StreamReset {
        stream_id: StreamId,
        error_code: ErrorCode,
    },
    GoAway {
        last_stream_id: StreamId,
        error_code: ErrorCode,
    },
    Error(ConnectionError),
}

/// Fatal and per-frame connection errors.
#[derive(Debug)]
pub enum ConnectionError {
    Frame(FrameError),
    Hpack(HpackError),
    Protocol(String),
    Io(io::Error),
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionError::Frame(e) => write!(f, "frame error: {}", e),
            ConnectionError::Hpack(e) => write!(f, "header compression error: {}", e),
            ConnectionError::Protocol(msg) => write!(f, "protocol error: {}", msg),
            ConnectionError::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for ConnectionError {}

impl From<FrameError> for ConnectionError {
    fn from(e: FrameError) -> Self {
        ConnectionError::Frame(e)
    }
}

impl From<HpackError> for ConnectionError {
    fn from(e: HpackError) -> Self {
        ConnectionError::Hpack(e)
    }
}

impl From<io::Error> for ConnectionError {
    fn from(e: io::Error) -> Self {
        ConnectionError::Io(e)
    }
}

/// HTTP/2 client connection over a transport.
pub struct Connection<T: Transport> {
    transport: T,
    state: ConnectionState,
    local_settings: ConnectionSettings,
    remote_settings: ConnectionSettings,
    got_settings: bool,
    frame_encoder: FrameEncoder,
    frame_decoder: FrameDecoder,
    hpack_encoder: HpackEncoder,
    hpack_decoder: HpackDecoder,
    streams: HashMap<u32, Stream>,
    next_stream_id: u32,
    /// Receive-side connection window.
    recv_flow: FlowControl,
    /// Send budget granted by the peer at the connection level.
    send_window: i64,
    write_buf: BytesMut,
    read_buf: BytesMut,
    events: Vec<ConnectionEvent>,
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T) -> Self {
        Self::with_settings(transport, ConnectionSettings::default())
    }

    pub fn with_settings(transport: T, settings: ConnectionSettings) -> Self {
        let mut frame_decoder = FrameDecoder::new();
        // The peer may send frames as large as we advertise.
        frame_decoder.set_max_frame_size(settings.max_frame_size);
        Self {
            transport,
            state: ConnectionState::WaitingPreface,
            local_settings: settings,
            remote_settings: ConnectionSettings::default(),
            got_settings: false,
            frame_encoder: FrameEncoder::new(),
            frame_decoder,
            hpack_encoder: HpackEncoder::new(),
            hpack_decoder: HpackDecoder::new(),
            streams: HashMap::new(),
            // Clients use odd stream IDs.
            next_stream_id: 1,
            recv_flow: FlowControl::new(DEFAULT_INITIAL_WINDOW_SIZE),
            send_window: DEFAULT_INITIAL_WINDOW_SIZE as i64,
            write_buf: BytesMut::with_capacity(16_384),
            read_buf: BytesMut::with_capacity(16_384),
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether requests may start right now.
    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Open && self.transport.is_ready()
    }

    /// Advance the connection once the transport can carry application
    /// data. Sends the preface and our SETTINGS exactly once.
    pub fn on_transport_ready(&mut self) -> io::Result<()> {
        if self.state != ConnectionState::WaitingPreface || !self.transport.is_ready() {
            return Ok(());
        }
        tracing::debug!("sending connection preface");
        self.write_buf.extend_from_slice(CONNECTION_PREFACE);
        let settings = Frame::Settings {
            ack: false,
            settings: self.local_settings.to_settings(),
        };
        self.frame_encoder.encode(&settings, &mut self.write_buf);
        self.hpack_decoder
            .set_max_table_size(self.local_settings.header_table_size as usize);
        self.state = ConnectionState::WaitingSettings;
        self.flush_write_buf()
    }

    /// Feed bytes read off the socket.
    pub fn on_recv(&mut self, data: &[u8]) -> io::Result<()> {
        self.transport.on_recv(data)?;
        // A TLS transport may only now have finished its handshake.
        self.on_transport_ready()?;
        self.drain_transport()
    }

    fn drain_transport(&mut self) -> io::Result<()> {
        let mut buf = [0u8; 16_384];
        loop {
            match self.transport.recv(&mut buf) {
                Ok(0) => break,
                Ok(n) => self.read_buf.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        self.process_frames()
    }

    fn process_frames(&mut self) -> io::Result<()> {
        loop {
            match self.frame_decoder.decode(&mut self.read_buf) {
                Ok(Some(frame)) => self.handle_frame(frame)?,
                Ok(None) => break,
                Err(e) => {
                    self.events.push(ConnectionEvent::Error(e.into()));
                    break;
                }
            }
        }
        Ok(())
    }

    fn handle_frame(&mut self, frame: Frame) -> io::Result<()> {
        match frame {
            Frame::Settings { ack, settings } => self.handle_settings(ack, settings)?,
            Frame::Ping { ack, data } => self.handle_ping(ack, data)?,
            Frame::GoAway {
                last_stream_id,
                error_code,
                ..
            } => {
                tracing::debug!(%last_stream_id, error_code, "goaway received");
                self.state = ConnectionState::Draining;
                self.events.push(ConnectionEvent::GoAway {
                    last_stream_id,
                    error_code: ErrorCode::from_u32(error_code),
                });
            }
            Frame::WindowUpdate {
                stream_id,
                increment,
            } => {
                if stream_id.is_connection() {
                    self.send_window += increment as i64;
                } else if let Some(stream) = self.streams.get_mut(&stream_id.value()) {
                    stream.send_window += increment as i64;
                }
            }
            Frame::Headers {
                stream_id,
                header_block,
                end_stream,
                end_headers,
                ..
            } => self.handle_headers(stream_id, header_block, end_stream, end_headers)?,
            Frame::Data {
                stream_id,
                data,
                end_stream,
            } => self.handle_data(stream_id, data, end_stream)?,
            Frame::RstStream {
                stream_id,
                error_code,
            } => {
                if let Some(stream) = self.streams.get_mut(&stream_id.value()) {
                    stream.reset();
                }
                self.events.push(ConnectionEvent::StreamReset {
                    stream_id,
                    error_code: ErrorCode::from_u32(error_code),
                });
            }
            // Priority scheduling is out of scope for a single-call client.
            Frame::Priority { .. } => {}
            // Push is disabled in our SETTINGS; a compliant server never
            // sends these. Drop them rather than tear the connection down.
            Frame::PushPromise { .. } => {}
            Frame::Continuation { .. } => {
                // Header blocks are sent whole (END_HEADERS always set), so
                // continuations from the peer of our single-frame requests
                // only occur for oversized response header lists.
                self.events
                    .push(ConnectionEvent::Error(ConnectionError::Protocol(
                        "CONTINUATION frames are not supported".to_string(),
                    )));
            }
            Frame::Unknown { frame_type, .. } => {
                tracing::trace!(frame_type, "ignoring unknown frame type");
            }
        }
        Ok(())
    }

    fn handle_settings(
        &mut self,
        ack: bool,
        settings: Vec<crate::frame::Setting>,
    ) -> io::Result<()> {
        if ack {
            return Ok(());
        }
        for setting in &settings {
            match setting.id {
                setting_id::HEADER_TABLE_SIZE => {
                    self.remote_settings.header_table_size = setting.value;
                    self.hpack_encoder.set_max_table_size(setting.value as usize);
                }
                setting_id::MAX_CONCURRENT_STREAMS => {
                    self.remote_settings.max_concurrent_streams = setting.value;
                }
                setting_id::INITIAL_WINDOW_SIZE => {
                    let delta =
                        setting.value as i64 - self.remote_settings.initial_window_size as i64;
                    self.remote_settings.initial_window_size = setting.value;
                    for stream in self.streams.values_mut() {
                        stream.send_window += delta;
                    }
                }
                setting_id::MAX_FRAME_SIZE => {
                    self.remote_settings.max_frame_size = setting.value;
                    self.frame_encoder.set_max_frame_size(setting.value);
                }
                _ => {}
            }
        }

        self.frame_encoder.encode(
            &Frame::Settings {
                ack: true,
                settings: vec![],
            },
            &mut self.write_buf,
        );

        if !self.got_settings {
            self.got_settings = true;
            self.state = ConnectionState::Open;
            tracing::debug!("settings exchange complete");
            self.events.push(ConnectionEvent::Ready);
        }

        self.flush_write_buf()
    }

    fn handle_ping(&mut self, ack: bool, data: [u8; 8]) -> io::Result<()> {
        if ack {
            return Ok(());
        }
        self.frame_encoder
            .encode(&Frame::Ping { ack: true, data }, &mut self.write_buf);
        self.flush_write_buf()
    }

    fn handle_headers(
        &mut self,
        stream_id: StreamId,
        header_block: Bytes,
        end_stream: bool,
        end_headers: bool,
    ) -> io::Result<()> {
        if !end_headers {
            self.events
                .push(ConnectionEvent::Error(ConnectionError::Protocol(
                    "fragmented header blocks are not supported".to_string(),
                )));
            return Ok(());
        }
        let headers = match self.hpack_decoder.decode(&header_block) {
            Ok(h) => h,
            Err(e) => {
                self.events.push(ConnectionEvent::Error(e.into()));
                return Ok(());
            }
        };
        if end_stream {
            if let Some(stream) = self.streams.get_mut(&stream_id.value()) {
                stream.close_remote();
            }
        }
        self.events.push(ConnectionEvent::Headers {
            stream_id,
            headers,
            end_stream,
        });
        Ok(())
    }

    fn handle_data(&mut self, stream_id: StreamId, data: Bytes, end_stream: bool) -> io::Result<()> {
        let len = data.len() as u32;

        if let Some(stream) = self.streams.get_mut(&stream_id.value()) {
            stream.recv_window -= len as i64;
            if end_stream {
                stream.close_remote();
            }
        }

        self.recv_flow.consume(len);
        if let Some(increment) = self.recv_flow.take_update() {
            self.frame_encoder.encode(
                &Frame::WindowUpdate {
                    stream_id: StreamId::CONNECTION,
                    increment,
                },
                &mut self.write_buf,
            );
            // Hand the same budget back on the stream so a long response
            // never stalls on the per-stream window.
            if !end_stream {
                self.frame_encoder.encode(
                    &Frame::WindowUpdate {
                        stream_id,
                        increment,
                    },
                    &mut self.write_buf,
                );
                if let Some(stream) = self.streams.get_mut(&stream_id.value()) {
                    stream.recv_window += increment as i64;
                }
            }
            self.flush_write_buf()?;
        }

        self.events.push(ConnectionEvent::Data {
            stream_id,
            data,
            end_stream,
        });
        Ok(())
    }

    /// Open a new stream with one complete header block.
    ///
    /// END_HEADERS is always set; `end_stream` marks a request without a
    /// body. Returns the allocated stream ID.
    pub fn start_request(
        &mut self,
        headers: &[HeaderField],
        end_stream: bool,
    ) -> io::Result<StreamId> {
        if self.state != ConnectionState::Open {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection not ready",
            ));
        }

        let stream_id = StreamId::new(self.next_stream_id);
        self.next_stream_id += 2;

        let mut stream = Stream::new(
            stream_id,
            self.remote_settings.initial_window_size,
            self.local_settings.initial_window_size,
        );
        if end_stream {
            stream.close_local();
        }
        self.streams.insert(stream_id.value(), stream);

        let mut header_block = Vec::new();
        self.hpack_encoder.encode(headers, &mut header_block);

        tracing::trace!(%stream_id, headers = headers.len(), "starting request stream");
        self.frame_encoder.encode(
            &Frame::Headers {
                stream_id,
                header_block: Bytes::from(header_block),
                end_stream,
                end_headers: true,
                priority: None,
            },
            &mut self.write_buf,
        );
        self.flush_write_buf()?;
        Ok(stream_id)
    }

    /// Send request body bytes on a stream.
    ///
    /// Sends at most what both flow-control windows and the peer's max
    /// frame size allow; returns the number of bytes accepted.
    /// `WouldBlock` means the windows are exhausted.
    pub fn send_data(
        &mut self,
        stream_id: StreamId,
        data: &[u8],
        end_stream: bool,
    ) -> io::Result<usize> {
        let stream = self
            .streams
            .get(&stream_id.value())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "stream not found"))?;
        if !stream.can_send() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "stream closed for sending",
            ));
        }

        let budget = self
            .send_window
            .min(stream.send_window)
            .max(0) as usize;
        let to_send = data
            .len()
            .min(budget)
            .min(self.frame_encoder.max_frame_size() as usize);
        let is_end = end_stream && to_send == data.len();

        if to_send == 0 && !data.is_empty() {
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }

        self.send_window -= to_send as i64;
        if let Some(stream) = self.streams.get_mut(&stream_id.value()) {
            stream.send_window -= to_send as i64;
            if is_end {
                stream.close_local();
            }
        }

        self.frame_encoder.encode(
            &Frame::Data {
                stream_id,
                data: Bytes::copy_from_slice(&data[..to_send]),
                end_stream: is_end,
            },
            &mut self.write_buf,
        );
        self.flush_write_buf()?;
        Ok(to_send)
    }

    /// Cancel a stream with RST_STREAM.
    pub fn reset_stream(&mut self, stream_id: StreamId, error_code: ErrorCode) -> io::Result<()> {
        if let Some(stream) = self.streams.get_mut(&stream_id.value()) {
            stream.reset();
        }
        self.frame_encoder.encode(
            &Frame::RstStream {
                stream_id,
                error_code: error_code.to_u32(),
            },
            &mut self.write_buf,
        );
        self.flush_write_buf()
    }

    /// Drop book-keeping for a finished stream.
    pub fn release_stream(&mut self, stream_id: StreamId) {
        self.streams.remove(&stream_id.value());
    }

    /// Send GOAWAY(NO_ERROR) and shut the transport down.
    pub fn close(&mut self) -> io::Result<()> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        let last = StreamId::new(self.next_stream_id.saturating_sub(2));
        self.frame_encoder.encode(
            &Frame::GoAway {
                last_stream_id: last,
                error_code: ErrorCode::NoError.to_u32(),
                debug_data: Bytes::new(),
            },
            &mut self.write_buf,
        );
        self.flush_write_buf()?;
        self.transport.shutdown()?;
        self.state = ConnectionState::Closed;
        Ok(())
    }

    fn flush_write_buf(&mut self) -> io::Result<()> {
        if !self.write_buf.is_empty() && self.transport.is_ready() {
            let n = self.transport.send(&self.write_buf)?;
            let _ = self.write_buf.split_to(n);
        }
        Ok(())
    }

    /// Drain queued events.
    pub fn poll_events(&mut self) -> Vec<ConnectionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Bytes waiting for the socket.
    pub fn pending_send(&self) -> &[u8] {
        self.transport.pending_send()
    }

    pub fn advance_send(&mut self, n: usize) {
        self.transport.advance_send(n);
    }

    pub fn has_pending_send(&self) -> bool {
        self.transport.has_pending_send() || !self.write_buf.is_empty()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::PlainTransport;

    /// Server-side helpers that script peer frames onto the wire.
    struct Peer {
        encoder: FrameEncoder,
        hpack: HpackEncoder,
    }

    impl Peer {
        fn new() -> Self {
            Self {
                encoder: FrameEncoder::new(),
                hpack: HpackEncoder::new(),
            }
        }

        fn settings(&mut self, settings: Vec<crate::frame::Setting>) -> BytesMut {
            let mut buf = BytesMut::new();
            self.encoder
                .encode(&Frame::Settings { ack: false, settings }, &mut buf);
            buf
        }

        fn headers(&mut self, stream_id: u32, fields: &[(&str, &str)], end_stream: bool) -> BytesMut {
            let fields: Vec<HeaderField> = fields
                .iter()
                .map(|&(n, v)| HeaderField::new(n.as_bytes(), v.as_bytes()))
                .collect();
            let mut block = Vec::new();
            self.hpack.encode(&fields, &mut block);
            let mut buf = BytesMut::new();
            self.encoder.encode(
                &Frame::Headers {
                    stream_id: StreamId::new(stream_id),
                    header_block: Bytes::from(block),
                    end_stream,
                    end_headers: true,
                    priority: None,
                },
                &mut buf,
            );
            buf
        }

        fn data(&mut self, stream_id: u32, data: &'static [u8], end_stream: bool) -> BytesMut {
            let mut buf = BytesMut::new();
            self.encoder.encode(
                &Frame::Data {
                    stream_id: StreamId::new(stream_id),
                    data: Bytes::from_static(data),
                    end_stream,
                },
                &mut buf,
            );
            buf
        }
    }

    fn open_connection() -> (Connection<PlainTransport>, Peer) {
        let mut conn = Connection::new(PlainTransport::new());
        conn.on_transport_ready().unwrap();
        let mut peer = Peer::new();
        let settings = peer.settings(vec![]);
        conn.on_recv(&settings).unwrap();
        let events = conn.poll_events();
        assert!(matches!(events[..], [ConnectionEvent::Ready]));
        (conn, peer)
    }

    #[test]
    fn test_preface_sent_on_transport_ready() {
        let mut conn = Connection::new(PlainTransport::new());
        assert_eq!(conn.state(), ConnectionState::WaitingPreface);
        conn.on_transport_ready().unwrap();
        assert_eq!(conn.state(), ConnectionState::WaitingSettings);
        assert!(conn.pending_send().starts_with(CONNECTION_PREFACE));
    }

    #[test]
    fn test_preface_sent_once() {
        let mut conn = Connection::new(PlainTransport::new());
        conn.on_transport_ready().unwrap();
        let len = conn.pending_send().len();
        conn.on_transport_ready().unwrap();
        assert_eq!(conn.pending_send().len(), len);
    }

    #[test]
    fn test_settings_exchange_opens_connection() {
        let (conn, _) = open_connection();
        assert_eq!(conn.state(), ConnectionState::Open);
        assert!(conn.is_ready());
    }

    #[test]
    fn test_server_settings_are_acked() {
        let mut conn = Connection::new(PlainTransport::new());
        conn.on_transport_ready().unwrap();
        let sent_before = conn.pending_send().len();
        let mut peer = Peer::new();
        conn.on_recv(&peer.settings(vec![])).unwrap();
        // A 9-byte SETTINGS ACK frame was queued.
        let tail = &conn.pending_send()[sent_before..];
        assert_eq!(tail, &[0, 0, 0, 0x4, 0x1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_request_before_open_fails() {
        let mut conn = Connection::new(PlainTransport::new());
        conn.on_transport_ready().unwrap();
        assert!(conn
            .start_request(&[HeaderField::new(":method", "POST")], false)
            .is_err());
    }

    #[test]
    fn test_stream_ids_are_odd_and_increasing() {
        let (mut conn, _) = open_connection();
        let a = conn.start_request(&[HeaderField::new(":method", "POST")], true).unwrap();
        let b = conn.start_request(&[HeaderField::new(":method", "POST")], true).unwrap();
        assert_eq!(a.value(), 1);
        assert_eq!(b.value(), 3);
    }

    #[test]
    fn test_ping_is_answered() {
        let (mut conn, mut peer) = open_connection();
        conn.advance_send(conn.pending_send().len());
        let mut buf = BytesMut::new();
        peer.encoder.encode(
            &Frame::Ping {
                ack: false,
                data: [9; 8],
            },
            &mut buf,
        );
        conn.on_recv(&buf).unwrap();
        // PING ACK with the same payload.
        let sent = conn.pending_send();
        assert_eq!(sent[3], 0x6);
        assert_eq!(sent[4], 0x1);
        assert_eq!(&sent[9..], &[9; 8]);
    }

    #[test]
    fn test_response_events_for_stream() {
        let (mut conn, mut peer) = open_connection();
        let stream_id = conn
            .start_request(&[HeaderField::new(":method", "POST")], true)
            .unwrap();

        let headers = peer.headers(stream_id.value(), &[(":status", "200")], false);
        conn.on_recv(&headers).unwrap();
        let body = peer.data(stream_id.value(), b"response", true);
        conn.on_recv(&body).unwrap();

        let events = conn.poll_events();
        assert_eq!(events.len(), 2);
        match &events[0] {
            ConnectionEvent::Headers {
                headers,
                end_stream,
                ..
            } => {
                assert_eq!(headers[0], HeaderField::new(":status", "200"));
                assert!(!end_stream);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match &events[1] {
            ConnectionEvent::Data {
                data, end_stream, ..
            } => {
                assert_eq!(&data[..], b"response");
                assert!(end_stream);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_goaway_drains_connection() {
        let (mut conn, mut peer) = open_connection();
        let mut buf = BytesMut::new();
        peer.encoder.encode(
            &Frame::GoAway {
                last_stream_id: StreamId::CONNECTION,
                error_code: ErrorCode::NoError.to_u32(),
                debug_data: Bytes::new(),
            },
            &mut buf,
        );
        conn.on_recv(&buf).unwrap();
        assert_eq!(conn.state(), ConnectionState::Draining);
        assert!(matches!(
            conn.poll_events()[..],
            [ConnectionEvent::GoAway { .. }]
        ));
        assert!(conn.start_request(&[], true).is_err());
    }

    #[test]
    fn test_rst_stream_event() {
        let (mut conn, mut peer) = open_connection();
        let stream_id = conn.start_request(&[], true).unwrap();
        let mut buf = BytesMut::new();
        peer.encoder.encode(
            &Frame::RstStream {
                stream_id,
                error_code: ErrorCode::RefusedStream.to_u32(),
            },
            &mut buf,
        );
        conn.on_recv(&buf).unwrap();
        match &conn.poll_events()[..] {
            [ConnectionEvent::StreamReset { error_code, .. }] => {
                assert_eq!(*error_code, ErrorCode::RefusedStream);
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn test_send_data_respects_connection_window() {
        let (mut conn, _) = open_connection();
        let stream_id = conn.start_request(&[], false).unwrap();
        // Default window is 65535; a larger body is truncated.
        let big = vec![0u8; 100_000];
        let sent = conn.send_data(stream_id, &big, true).unwrap();
        assert!(sent <= 65_535);
        assert!(sent <= conn.frame_encoder.max_frame_size() as usize);
    }

    #[test]
    fn test_send_data_blocked_when_window_empty() {
        let (mut conn, mut peer) = open_connection();
        // Peer grants a zero stream window to new streams.
        let settings = peer.settings(vec![crate::frame::Setting {
            id: setting_id::INITIAL_WINDOW_SIZE,
            value: 0,
        }]);
        conn.on_recv(&settings).unwrap();
        let stream_id = conn.start_request(&[], false).unwrap();
        let err = conn.send_data(stream_id, b"payload", true).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_window_update_unblocks_stream() {
        let (mut conn, mut peer) = open_connection();
        let settings = peer.settings(vec![crate::frame::Setting {
            id: setting_id::INITIAL_WINDOW_SIZE,
            value: 0,
        }]);
        conn.on_recv(&settings).unwrap();
        let stream_id = conn.start_request(&[], false).unwrap();
        assert!(conn.send_data(stream_id, b"payload", true).is_err());

        let mut buf = BytesMut::new();
        peer.encoder.encode(
            &Frame::WindowUpdate {
                stream_id,
                increment: 1_024,
            },
            &mut buf,
        );
        conn.on_recv(&buf).unwrap();
        assert_eq!(conn.send_data(stream_id, b"payload", true).unwrap(), 7);
    }

    #[test]
    fn test_max_frame_size_setting_applied() {
        let (mut conn, mut peer) = open_connection();
        let settings = peer.settings(vec![crate::frame::Setting {
            id: setting_id::MAX_FRAME_SIZE,
            value: 32_768,
        }]);
        conn.on_recv(&settings).unwrap();
        assert_eq!(conn.frame_encoder.max_frame_size(), 32_768);
    }

    #[test]
    fn test_close_sends_goaway() {
        let (mut conn, _) = open_connection();
        conn.advance_send(conn.pending_send().len());
        conn.close().unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_window_update_sent_after_large_read() {
        let (mut conn, mut peer) = open_connection();
        let stream_id = conn.start_request(&[], true).unwrap();
        conn.advance_send(conn.pending_send().len());

        // Feed DATA frames totalling more than half the 65535 window.
        static CHUNK: [u8; 16_000] = [0u8; 16_000];
        for _ in 0..2 {
            let frame = peer.data(stream_id.value(), &CHUNK, false);
            conn.on_recv(&frame).unwrap();
        }
        let frame = peer.data(stream_id.value(), &CHUNK, true);
        conn.on_recv(&frame).unwrap();

        // A connection-level WINDOW_UPDATE went out.
        let sent = conn.pending_send();
        assert!(!sent.is_empty());
        assert_eq!(sent[3], 0x8);
    }
}
