//! # Credit Window
//!
//! Bounds how far the sender may run ahead of the receiver. Every frame sent
//! consumes one credit; every acknowledgment byte received returns one. With
//! a window of `W`, a frame may be sent only while `confirmed + W >= sent + 1`,
//! so at most `W` frames are ever unacknowledged.
//!
//! Ack bytes are counted, not correlated: a read returning `n` bytes confirms
//! `n` frames regardless of how the receiver batched them.

use std::num::NonZeroU32;

/// Sent/confirmed counters for one session.
#[derive(Debug, Clone)]
pub struct CreditWindow {
    window: u64,
    sent: u64,
    confirmed: u64,
}

impl CreditWindow {
    pub fn new(window: NonZeroU32) -> Self {
        CreditWindow {
            window: u64::from(window.get()),
            sent: 0,
            confirmed: 0,
        }
    }

    /// Configured window size.
    pub fn window(&self) -> u64 {
        self.window
    }

    /// Frames transmitted so far (`S`).
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Acknowledgment bytes received so far (`C`).
    pub fn confirmed(&self) -> u64 {
        self.confirmed
    }

    /// Whether one more frame fits in the window.
    #[inline]
    pub fn can_send(&self) -> bool {
        self.confirmed.saturating_add(self.window) > self.sent
    }

    /// Frames that may still be sent before the next ack arrives.
    #[inline]
    pub fn credits(&self) -> u64 {
        self.confirmed
            .saturating_add(self.window)
            .saturating_sub(self.sent)
    }

    /// Sent but not yet acknowledged.
    #[inline]
    pub fn in_flight(&self) -> u64 {
        self.sent.saturating_sub(self.confirmed)
    }

    /// Records one transmitted frame. Callers must check
    /// [`can_send`](Self::can_send) first.
    #[inline]
    pub fn on_sent(&mut self) {
        debug_assert!(self.can_send(), "frame sent with exhausted window");
        self.sent += 1;
    }

    /// Records `count` acknowledgment bytes.
    #[inline]
    pub fn on_acks(&mut self, count: usize) {
        self.confirmed = self.confirmed.saturating_add(count as u64);
    }

    /// Zeroes both counters.
    pub fn reset(&mut self) {
        self.sent = 0;
        self.confirmed = 0;
    }
}
