//! Dependency-light gRPC client for embedded devices.
//!
//! Speaks unary gRPC over HTTP/2 through the `picogrpc-h2` protocol
//! engine, with no code generation framework, no async runtime, and no
//! background threads. Calls are synchronous: one channel carries one
//! call at a time, and the calling thread drives the socket until the
//! response or the deadline arrives.
//!
//! ```no_run
//! use picogrpc::{create_channel, ChannelCredentials, ClientContext};
//! use std::time::Duration;
//!
//! let channel = create_channel("https://gateway.example.com", ChannelCredentials::ssl(Default::default()));
//! let mut context = ClientContext::new();
//! context.set_timeout(Duration::from_secs(5));
//! let response = channel.execute_request("/helloworld.Greeter/SayHello", &context, b"...")?;
//! # Ok::<(), picogrpc::Status>(())
//! ```

pub mod args;
pub mod channel;
pub mod codec;
pub mod context;
pub mod credentials;
pub mod frame;
pub mod session;
pub mod status;
pub mod stub;

pub use args::{arg_keys, ChannelArguments};
pub use channel::{create_channel, create_custom_channel, Channel};
pub use context::ClientContext;
pub use credentials::{ChannelCredentials, SslCredentialsOptions};
pub use session::Http2Response;
pub use status::{Status, StatusCode};
pub use stub::StubInterface;
