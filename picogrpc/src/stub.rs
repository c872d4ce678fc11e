//! Base type for generated service stubs.

use std::sync::Arc;

use bytes::Bytes;

use crate::channel::Channel;
use crate::context::ClientContext;
use crate::status::Status;

/// Channel holder that generated stubs build on.
///
/// A stub wraps `make_call` with typed encode and decode; everything
/// transport-related stays in the channel.
#[derive(Default)]
pub struct StubInterface {
    channel: Option<Arc<Channel>>,
}

impl StubInterface {
    pub fn new(channel: Arc<Channel>) -> Self {
        Self {
            channel: Some(channel),
        }
    }

    /// A stub with no channel; every call fails until one is bound.
    pub fn unbound() -> Self {
        Self { channel: None }
    }

    pub fn bind(&mut self, channel: Arc<Channel>) {
        self.channel = Some(channel);
    }

    pub fn channel(&self) -> Option<&Arc<Channel>> {
        self.channel.as_ref()
    }

    /// Forward one unary call to the bound channel.
    pub fn make_call(
        &self,
        method: &str,
        context: &ClientContext,
        request: &[u8],
    ) -> Result<Bytes, Status> {
        match &self.channel {
            Some(channel) => channel.execute_request(method, context, request),
            None => Err(Status::internal("channel not available")),
        }
    }
}
