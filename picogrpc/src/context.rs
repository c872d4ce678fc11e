//! Per-call client context: metadata, deadline, and call options.

use std::time::{Duration, Instant};

/// Call-scoped options and metadata for a single RPC.
///
/// A context belongs to exactly one call. Construct a fresh one per
/// request; there is no reset. The type is intentionally not `Clone`:
/// sharing a context between calls is a bug this API cannot express.
#[derive(Debug, Default)]
pub struct ClientContext {
    /// Insertion-ordered so headers hit the wire in a stable order.
    metadata: Vec<(String, String)>,
    deadline: Option<Instant>,
    authority: Option<String>,
    compression_algorithm: Option<String>,
    user_agent_prefix: Option<String>,
}

impl ClientContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a metadata entry. Keys are lower-cased; setting the same
    /// key twice keeps the last value at the original position.
    pub fn add_metadata(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        let key = key.as_ref().to_ascii_lowercase();
        let value = value.into();
        match self.metadata.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.metadata.push((key, value)),
        }
    }

    /// Metadata entries in insertion order.
    pub fn metadata(&self) -> &[(String, String)] {
        &self.metadata
    }

    /// Set an absolute deadline for the call.
    pub fn set_deadline(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }

    /// Set the deadline relative to now.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.deadline = Some(Instant::now() + timeout);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.deadline, Some(d) if Instant::now() >= d)
    }

    /// Time left before the deadline. `None` when no deadline is set;
    /// `Some(Duration::ZERO)` when it has already passed.
    pub fn remaining_timeout(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Override the `:authority` pseudo-header for this call.
    pub fn set_authority(&mut self, authority: impl Into<String>) {
        self.authority = Some(authority.into());
    }

    pub fn authority(&self) -> Option<&str> {
        self.authority.as_deref()
    }

    /// Name a compression algorithm for the `grpc-encoding` header.
    /// Advisory only: request payloads are always sent uncompressed.
    pub fn set_compression_algorithm(&mut self, algorithm: impl Into<String>) {
        self.compression_algorithm = Some(algorithm.into());
    }

    pub fn compression_algorithm(&self) -> Option<&str> {
        self.compression_algorithm.as_deref()
    }

    /// Prefix prepended to the default user-agent string.
    pub fn set_user_agent_prefix(&mut self, prefix: impl Into<String>) {
        self.user_agent_prefix = Some(prefix.into());
    }

    pub fn user_agent_prefix(&self) -> Option<&str> {
        self.user_agent_prefix.as_deref()
    }
}

/// Render a timeout as a `grpc-timeout` header value.
///
/// The wire format is at most 8 digits plus a unit. Millisecond
/// precision is used until the digit budget runs out, then coarser
/// units; timeouts too large to express saturate at the maximum hour
/// value.
pub fn format_grpc_timeout(timeout: Duration) -> String {
    const MAX: u128 = 99_999_999;
    let millis = timeout.as_millis();
    if millis <= MAX {
        return format!("{}m", millis);
    }
    let secs = timeout.as_secs() as u128;
    if secs <= MAX {
        return format!("{}S", secs);
    }
    let mins = secs / 60;
    if mins <= MAX {
        return format!("{}M", mins);
    }
    let hours = mins / 60;
    format!("{}H", hours.min(MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(ctx: &'a ClientContext, key: &str) -> Option<&'a str> {
        ctx.metadata()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_metadata_keys_lowercased() {
        let mut ctx = ClientContext::new();
        ctx.add_metadata("X-Request-Id", "abc");
        assert_eq!(lookup(&ctx, "x-request-id"), Some("abc"));
        assert_eq!(lookup(&ctx, "X-Request-Id"), None);
    }

    #[test]
    fn test_duplicate_metadata_key_overwrites() {
        let mut ctx = ClientContext::new();
        ctx.add_metadata("key", "first");
        ctx.add_metadata("KEY", "second");
        assert_eq!(ctx.metadata().len(), 1);
        assert_eq!(lookup(&ctx, "key"), Some("second"));
    }

    #[test]
    fn test_metadata_preserves_insertion_order() {
        let mut ctx = ClientContext::new();
        ctx.add_metadata("x-first", "1");
        ctx.add_metadata("x-second", "2");
        ctx.add_metadata("x-third", "3");
        // Overwriting keeps the original position.
        ctx.add_metadata("x-second", "2b");
        let keys: Vec<&str> = ctx.metadata().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["x-first", "x-second", "x-third"]);
        assert_eq!(lookup(&ctx, "x-second"), Some("2b"));
    }

    #[test]
    fn test_no_deadline_by_default() {
        let ctx = ClientContext::new();
        assert!(ctx.deadline().is_none());
        assert!(!ctx.is_expired());
        assert!(ctx.remaining_timeout().is_none());
    }

    #[test]
    fn test_future_deadline_not_expired() {
        let mut ctx = ClientContext::new();
        ctx.set_timeout(Duration::from_secs(30));
        assert!(!ctx.is_expired());
        let remaining = ctx.remaining_timeout().unwrap();
        assert!(remaining > Duration::from_secs(29));
        assert!(remaining <= Duration::from_secs(30));
    }

    #[test]
    fn test_past_deadline_expired() {
        let mut ctx = ClientContext::new();
        ctx.set_deadline(Instant::now() - Duration::from_secs(1));
        assert!(ctx.is_expired());
        assert_eq!(ctx.remaining_timeout(), Some(Duration::ZERO));
    }

    #[test]
    fn test_authority_override() {
        let mut ctx = ClientContext::new();
        assert!(ctx.authority().is_none());
        ctx.set_authority("override.example.com");
        assert_eq!(ctx.authority(), Some("override.example.com"));
    }

    #[test]
    fn test_grpc_timeout_millis() {
        assert_eq!(format_grpc_timeout(Duration::from_millis(5_000)), "5000m");
        assert_eq!(format_grpc_timeout(Duration::from_millis(1)), "1m");
        assert_eq!(format_grpc_timeout(Duration::ZERO), "0m");
    }

    #[test]
    fn test_grpc_timeout_falls_back_to_coarser_units() {
        // 10^9 milliseconds does not fit in 8 digits; 10^6 seconds does.
        assert_eq!(
            format_grpc_timeout(Duration::from_secs(1_000_000)),
            "1000000S"
        );
    }
}
