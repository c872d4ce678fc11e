//! Channels: a target, credentials, and a lazily established session.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use picogrpc_h2::hpack::HeaderField;
#[cfg(feature = "tls")]
use picogrpc_h2::tls::TlsConfig;

use crate::args::ChannelArguments;
use crate::context::{format_grpc_timeout, ClientContext};
use crate::credentials::ChannelCredentials;
use crate::frame;
use crate::session::WireSession;
use crate::status::{Status, StatusCode};

const DEFAULT_USER_AGENT: &str = concat!("picogrpc/", env!("CARGO_PKG_VERSION"));

/// Polling interval for [`Channel::wait_for_connected`].
const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Parsed form of a channel target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTarget {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

impl ParsedTarget {
    /// The `:authority` value for this target. The port is omitted when
    /// it is the scheme default.
    fn authority(&self) -> String {
        let default_port = if self.use_tls { 443 } else { 80 };
        if self.port == default_port {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Parse `[scheme://]host[:port]`.
///
/// `http` forces cleartext and `https` forces TLS; with no scheme the
/// credentials decide. The default port is 80 or 443 by TLS choice.
pub fn parse_target(target: &str, credentials_secure: bool) -> Result<ParsedTarget, Status> {
    let (scheme, rest) = match target.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, target),
    };

    let use_tls = match scheme {
        None => credentials_secure,
        Some("http") => false,
        Some("https") => true,
        Some(other) => {
            return Err(Status::invalid_argument(format!(
                "unsupported scheme: {}",
                other
            )))
        }
    };

    let (host, port) = match rest.split_once(':') {
        Some((host, port_str)) => {
            let port: u16 = port_str.parse().map_err(|_| {
                Status::invalid_argument(format!("invalid port: {}", port_str))
            })?;
            (host, port)
        }
        None => (rest, if use_tls { 443 } else { 80 }),
    };

    if host.is_empty()
        || !host
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'_')
    {
        return Err(Status::invalid_argument(format!("invalid host: {}", host)));
    }

    Ok(ParsedTarget {
        host: host.to_string(),
        port,
        use_tls,
    })
}

/// A connection to one gRPC server.
///
/// Shareable through `Arc`; the internal session lock serializes calls,
/// so one channel carries one call at a time. The connection is
/// established lazily and re-established after `disconnect` or a
/// transport failure.
pub struct Channel {
    target: String,
    credentials: Arc<ChannelCredentials>,
    args: ChannelArguments,
    session: Mutex<Option<WireSession>>,
}

/// Create a channel with default arguments.
pub fn create_channel(target: impl Into<String>, credentials: Arc<ChannelCredentials>) -> Arc<Channel> {
    create_custom_channel(target, credentials, ChannelArguments::new())
}

/// Create a channel with explicit tuning arguments.
pub fn create_custom_channel(
    target: impl Into<String>,
    credentials: Arc<ChannelCredentials>,
    args: ChannelArguments,
) -> Arc<Channel> {
    Arc::new(Channel {
        target: target.into(),
        credentials,
        args,
        session: Mutex::new(None),
    })
}

impl Channel {
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn args(&self) -> &ChannelArguments {
        &self.args
    }

    /// Establish the connection now. Idempotent: an open session is
    /// left alone.
    pub fn connect(&self) -> Result<(), Status> {
        let mut guard = self.lock_session();
        self.ensure_session(&mut guard)?;
        Ok(())
    }

    /// Close the connection. The channel stays usable and reconnects on
    /// the next call.
    pub fn disconnect(&self) {
        let mut guard = self.lock_session();
        if let Some(mut session) = guard.take() {
            session.close();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock_session()
            .as_ref()
            .map(WireSession::is_open)
            .unwrap_or(false)
    }

    /// Poll until the channel is connected or `deadline` passes.
    /// Returns `false` on timeout; timeouts here are not errors.
    pub fn wait_for_connected(&self, deadline: Instant) -> bool {
        loop {
            if self.is_connected() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(CONNECT_POLL_INTERVAL);
        }
    }

    /// Run one unary RPC.
    ///
    /// `method` is the full path, e.g. `/package.Service/Method`;
    /// `request` is the serialized request message. Returns the
    /// serialized response message or a `Status`.
    pub fn execute_request(
        &self,
        method: &str,
        context: &ClientContext,
        request: &[u8],
    ) -> Result<Bytes, Status> {
        // An already-lapsed deadline fails before any transport work.
        if context.is_expired() {
            return Err(Status::deadline_exceeded("deadline expired before call"));
        }

        let mut guard = self.lock_session();
        let target = self.ensure_session(&mut guard)?;
        let headers = build_request_headers(method, context, &target);
        let body = frame::encode_message(request);

        tracing::debug!(method, "executing request");
        let session = guard.as_mut().ok_or_else(|| Status::internal("no session"))?;
        let result = session.execute(&headers, &body, context.deadline());

        let response = match result {
            Ok(response) => response,
            Err(status) => {
                // A dead transport cannot carry the next call.
                if status.code() == StatusCode::Unavailable {
                    if let Some(mut session) = guard.take() {
                        session.close();
                    }
                }
                return Err(status);
            }
        };

        if response.status_code != 200 {
            return Err(Status::internal(format!(
                "HTTP error: {}",
                response.status_code
            )));
        }

        if let Some(value) = response.header("grpc-status") {
            let code = value
                .parse::<u32>()
                .map(StatusCode::from_u32)
                .unwrap_or(StatusCode::Unknown);
            if !code.is_ok() {
                let message = response
                    .header("grpc-message")
                    .unwrap_or("Unknown gRPC error");
                return Err(Status::new(code, message));
            }
        }

        frame::decode_message(&response.body)
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<WireSession>> {
        // Lock poisoning only matters if a call panicked; the session
        // itself is still consistent enough to close and replace.
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Connect if there is no open session. Returns the parsed target.
    fn ensure_session(
        &self,
        guard: &mut std::sync::MutexGuard<'_, Option<WireSession>>,
    ) -> Result<ParsedTarget, Status> {
        let target = parse_target(&self.target, self.credentials.is_secure())?;

        let open = guard.as_ref().map(WireSession::is_open).unwrap_or(false);
        if !open {
            tracing::debug!(target = %self.target, tls = target.use_tls, "connecting");
            #[cfg(feature = "tls")]
            let session = {
                let tls_config = if target.use_tls {
                    Some(self.build_tls_config()?)
                } else {
                    None
                };
                WireSession::establish(&target.host, target.port, tls_config.as_ref())?
            };
            #[cfg(not(feature = "tls"))]
            let session = {
                if target.use_tls {
                    return Err(Status::internal(
                        "TLS support not compiled into this build",
                    ));
                }
                WireSession::establish(&target.host, target.port)?
            };
            **guard = Some(session);
        }
        Ok(target)
    }

    #[cfg(feature = "tls")]
    fn build_tls_config(&self) -> Result<TlsConfig, Status> {
        let roots = self
            .credentials
            .ssl_options()
            .map(|o| o.pem_root_certs.as_str())
            .unwrap_or("");
        let config = if roots.is_empty() {
            TlsConfig::http2()
        } else {
            TlsConfig::http2_with_roots(roots)
        };
        config.map_err(|e| Status::internal(format!("TLS setup failed: {}", e)))
    }
}

/// Assemble the HEADERS block for a call: pseudo-headers first, then
/// the fixed gRPC headers, then context metadata.
fn build_request_headers(
    method: &str,
    context: &ClientContext,
    target: &ParsedTarget,
) -> Vec<HeaderField> {
    let scheme = if target.use_tls { "https" } else { "http" };
    let authority = context
        .authority()
        .map(str::to_string)
        .unwrap_or_else(|| target.authority());
    let user_agent = match context.user_agent_prefix() {
        Some(prefix) => format!("{} {}", prefix, DEFAULT_USER_AGENT),
        None => DEFAULT_USER_AGENT.to_string(),
    };

    let mut headers = vec![
        HeaderField::new(":method", "POST"),
        HeaderField::new(":scheme", scheme),
        HeaderField::new(":path", method),
        HeaderField::new(":authority", authority),
        HeaderField::new("content-type", "application/grpc+proto"),
        HeaderField::new("te", "trailers"),
        HeaderField::new("user-agent", user_agent),
    ];

    if let Some(remaining) = context.remaining_timeout() {
        headers.push(HeaderField::new(
            "grpc-timeout",
            format_grpc_timeout(remaining),
        ));
    }
    if let Some(algorithm) = context.compression_algorithm() {
        headers.push(HeaderField::new("grpc-encoding", algorithm));
    }
    for (key, value) in context.metadata() {
        headers.push(HeaderField::new(key.as_bytes(), value.as_bytes()));
    }

    headers
}
