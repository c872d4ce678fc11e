//! Minimal HTTP/2 client protocol engine.
//!
//! Implements the subset of RFC 7540 and RFC 7541 a unary RPC client
//! needs: the frame codec, HPACK header compression with Huffman
//! coding, stream and connection state machines, flow control, and a
//! transport seam with plain and rustls-based TLS implementations.
//!
//! The engine performs no socket I/O of its own. The embedding layer
//! reads and writes the socket and shuttles bytes through
//! [`Connection::on_recv`] and [`Connection::pending_send`].

pub mod connection;
pub mod flow_control;
pub mod frame;
pub mod hpack;
pub mod huffman;
pub mod settings;
pub mod stream;
pub mod transport;

#[cfg(feature = "tls")]
pub mod tls;

pub use connection::{Connection, ConnectionError, ConnectionEvent, ConnectionState};
pub use frame::{ErrorCode, Frame, FrameDecoder, FrameEncoder, FrameError, StreamId};
pub use hpack::{HeaderField, HpackDecoder, HpackEncoder, HpackError};
pub use settings::ConnectionSettings;
pub use transport::{PlainTransport, Transport, TransportState};

#[cfg(feature = "tls")]
pub use tls::{TlsConfig, TlsTransport};
