//! # framelink Wire Format
//!
//! Frames are byte-stuffed between a start and an end marker. Any reserved
//! byte inside the payload is replaced by a two-byte escape sequence, so the
//! markers are unambiguous regardless of payload content.
//!
//! ```text
//!  START | escape(payload) ... | END
//!  0x01  | b, or 0x03 code     | 0x02
//! ```
//!
//! | Payload byte | Encoded as    |
//! |--------------|---------------|
//! | `0x01`       | `0x03 0x11`   |
//! | `0x02`       | `0x03 0x12`   |
//! | `0x03`       | `0x03 0x13`   |
//!
//! The receiver acknowledges every consumed frame with one byte on the same
//! connection. Ack bytes carry no content; only their count matters.

use std::time::Duration;

// ─── Markers ─────────────────────────────────────────────────────────────────

/// Begins a frame.
pub const START: u8 = 0x01;

/// Ends a frame.
pub const END: u8 = 0x02;

/// The next byte is an escape code.
pub const ESCAPE: u8 = 0x03;

/// Escape code for a literal [`START`] byte.
pub const ESCAPED_START: u8 = 0x11;

/// Escape code for a literal [`END`] byte.
pub const ESCAPED_END: u8 = 0x12;

/// Escape code for a literal [`ESCAPE`] byte.
pub const ESCAPED_ESCAPE: u8 = 0x13;

// ─── Defaults ────────────────────────────────────────────────────────────────

/// TCP port of the receiver when none is configured.
pub const DEFAULT_PORT: u16 = 40405;

/// Maximum frames in flight without acknowledgment when none is configured.
pub const DEFAULT_WINDOW: u32 = 10;

/// Configured ack wait. Carried through configuration only.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Bytes a frame adds on top of its escaped payload (START + END).
pub const FRAME_OVERHEAD: usize = 2;

/// Returns the escape code for a reserved byte, or `None` for plain bytes.
#[inline]
pub fn escape_code(byte: u8) -> Option<u8> {
    match byte {
        START => Some(ESCAPED_START),
        END => Some(ESCAPED_END),
        ESCAPE => Some(ESCAPED_ESCAPE),
        _ => None,
    }
}

/// Returns the reserved byte an escape code stands for.
#[inline]
pub fn unescape_code(code: u8) -> Option<u8> {
    match code {
        ESCAPED_START => Some(START),
        ESCAPED_END => Some(END),
        ESCAPED_ESCAPE => Some(ESCAPE),
        _ => None,
    }
}

/// Worst-case encoded size of a payload of `payload_len` bytes: every byte
/// escaped, plus the two markers.
#[inline]
pub fn max_encoded_len(payload_len: usize) -> usize {
    payload_len.saturating_mul(2).saturating_add(FRAME_OVERHEAD)
}
