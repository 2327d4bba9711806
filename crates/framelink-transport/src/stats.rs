//! # Sender Statistics
//!
//! Counters kept by the flow-controlled sender. Serializable so the output
//! binary can log a JSON snapshot when a session ends.

use serde::Serialize;

/// Aggregate sender-side statistics for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SenderStats {
    /// Frames written to the connection.
    pub frames_sent: u64,
    /// Encoded bytes written, markers and escapes included.
    pub bytes_sent: u64,
    /// Payload bytes before encoding.
    pub payload_bytes: u64,
    /// Acknowledgment bytes received.
    pub acks_received: u64,
    /// Frames the source produced that the sender never read.
    pub frames_skipped: u64,
    /// Times the sender had to wait for acknowledgments.
    pub window_stalls: u64,
    /// Total time spent waiting for acknowledgments, in µs.
    pub stall_time_us: u64,
    /// Times the frame buffers had to grow.
    pub buffer_growths: u64,
}

impl SenderStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoded bytes per payload byte. Above 1.0 for any traffic, since every
    /// frame carries its start and end markers on top of any escapes.
    pub fn encoding_overhead(&self) -> f64 {
        if self.payload_bytes == 0 {
            0.0
        } else {
            self.bytes_sent as f64 / self.payload_bytes as f64
        }
    }

    /// Share of produced frames that were actually sent.
    pub fn delivery_ratio(&self) -> f64 {
        let produced = self.frames_sent + self.frames_skipped;
        if produced == 0 {
            0.0
        } else {
            self.frames_sent as f64 / produced as f64
        }
    }
}
