//! Receive-side flow control accounting.
//!
//! Tracks how much window the peer has consumed and decides when to
//! hand it back with a WINDOW_UPDATE. Updates are batched: one is due
//! once half the window has been consumed, which keeps update frames
//! off the wire for small exchanges.

/// Flow-control window for one direction of one level (connection or
/// stream).
#[derive(Debug)]
pub struct FlowControl {
    window_size: u32,
    consumed: u32,
}

impl FlowControl {
    pub fn new(window_size: u32) -> Self {
        Self {
            window_size,
            consumed: 0,
        }
    }

    /// Account for `len` bytes of DATA received from the peer.
    pub fn consume(&mut self, len: u32) {
        self.consumed = self.consumed.saturating_add(len);
    }

    /// Remaining window before the peer must stall.
    pub fn available(&self) -> u32 {
        self.window_size.saturating_sub(self.consumed)
    }

    /// WINDOW_UPDATE increment to send now, if one is due.
    pub fn take_update(&mut self) -> Option<u32> {
        if self.consumed >= self.window_size / 2 && self.consumed > 0 {
            let increment = self.consumed;
            self.consumed = 0;
            Some(increment)
        } else {
            None
        }
    }

    pub fn set_window_size(&mut self, size: u32) {
        self.window_size = size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_update_for_small_consumption() {
        let mut fc = FlowControl::new(65_535);
        fc.consume(100);
        assert_eq!(fc.take_update(), None);
        assert_eq!(fc.available(), 65_435);
    }

    #[test]
    fn test_update_due_at_half_window() {
        let mut fc = FlowControl::new(65_535);
        fc.consume(40_000);
        assert_eq!(fc.take_update(), Some(40_000));
        // Consumed counter resets after the update.
        assert_eq!(fc.take_update(), None);
        assert_eq!(fc.available(), 65_535);
    }

    #[test]
    fn test_consumption_accumulates() {
        let mut fc = FlowControl::new(1_000);
        fc.consume(300);
        assert_eq!(fc.take_update(), None);
        fc.consume(300);
        assert_eq!(fc.take_update(), Some(600));
    }

    #[test]
    fn test_overconsumption_saturates() {
        let mut fc = FlowControl::new(100);
        fc.consume(u32::MAX);
        fc.consume(100);
        assert_eq!(fc.available(), 0);
    }
}
