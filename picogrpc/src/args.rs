//! Channel tuning arguments.
//!
//! A string-keyed bag of settings with three independent value
//! namespaces. The same key may hold an integer, a string, and an
//! opaque handle at once; setters always overwrite within their own
//! namespace and keys are never validated.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Well-known tuning keys, mirroring the core gRPC argument names.
pub mod arg_keys {
    pub const KEEPALIVE_TIME_MS: &str = "grpc.keepalive_time_ms";
    pub const KEEPALIVE_TIMEOUT_MS: &str = "grpc.keepalive_timeout_ms";
    pub const KEEPALIVE_PERMIT_WITHOUT_CALLS: &str = "grpc.keepalive_permit_without_calls";
    pub const HTTP2_MAX_PINGS_WITHOUT_DATA: &str = "grpc.http2.max_pings_without_data";
    pub const MAX_CONNECTION_IDLE_MS: &str = "grpc.max_connection_idle_ms";
    pub const MAX_CONNECTION_AGE_MS: &str = "grpc.max_connection_age_ms";
    pub const PRIMARY_USER_AGENT: &str = "grpc.primary_user_agent";
}

/// Opaque pointer-like argument value.
pub type ArgHandle = Arc<dyn Any + Send + Sync>;

#[derive(Default, Clone)]
pub struct ChannelArguments {
    ints: HashMap<String, i32>,
    strings: HashMap<String, String>,
    handles: HashMap<String, ArgHandle>,
}

impl ChannelArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_int(&mut self, key: impl Into<String>, value: i32) {
        self.ints.insert(key.into(), value);
    }

    pub fn get_int(&self, key: &str) -> Option<i32> {
        self.ints.get(key).copied()
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.strings.insert(key.into(), value.into());
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.strings.get(key).map(String::as_str)
    }

    pub fn set_handle(&mut self, key: impl Into<String>, value: ArgHandle) {
        self.handles.insert(key.into(), value);
    }

    pub fn get_handle(&self, key: &str) -> Option<&ArgHandle> {
        self.handles.get(key)
    }
}

impl std::fmt::Debug for ChannelArguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelArguments")
            .field("ints", &self.ints)
            .field("strings", &self.strings)
            .field("handles", &self.handles.keys())
            .finish()
    }
}
