//! # Frame Buffers
//!
//! Growable byte buffers with an explicit logical capacity. The sender keeps
//! two of them: a raw buffer holding the current frame as copied out of the
//! frame source, and an encoded buffer holding its wire form.
//!
//! Buffers start empty and are sized on the first frame. When a frame does
//! not fit, the raw buffer grows to twice the frame size and the encoded
//! buffer to the worst case for the new raw capacity (`2 * raw + 2`). Buffers
//! never shrink until they are released.

use thiserror::Error;
use tracing::debug;

use crate::codec::{self, CodecError};
use crate::wire::max_encoded_len;

// ─── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    /// The allocator refused the requested capacity.
    #[error("failed to allocate {requested} bytes for frame buffer")]
    Allocation { requested: usize },
    /// The requested capacity does not fit in `usize`.
    #[error("frame of {frame_len} bytes exceeds the addressable buffer size")]
    CapacityOverflow { frame_len: usize },
}

// ─── FrameBuffer ────────────────────────────────────────────────────────────

/// A byte buffer bounded by a logical capacity.
///
/// Writes beyond `capacity()` fail instead of reallocating; only
/// [`grow_to`](FrameBuffer::grow_to) changes the capacity.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    bytes: Vec<u8>,
    capacity: usize,
}

impl FrameBuffer {
    /// An unallocated buffer with zero capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer with `capacity` bytes reserved up front.
    pub fn with_capacity(capacity: usize) -> Result<Self, BufferError> {
        let mut buf = Self::new();
        buf.grow_to(capacity)?;
        Ok(buf)
    }

    /// Logical capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes in use.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Free space left before the buffer is exhausted.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity - self.bytes.len()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Resets usage to zero, keeping the capacity.
    #[inline]
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Drops everything past `len`. No effect if `len >= self.len()`.
    #[inline]
    pub fn truncate(&mut self, len: usize) {
        self.bytes.truncate(len);
    }

    /// Appends one byte. Returns `false` when the buffer is full.
    #[inline]
    pub fn push(&mut self, byte: u8) -> bool {
        if self.bytes.len() >= self.capacity {
            return false;
        }
        self.bytes.push(byte);
        true
    }

    /// Appends all of `data`, or nothing if it does not fit.
    pub fn extend_from_slice(&mut self, data: &[u8]) -> bool {
        if data.len() > self.remaining() {
            return false;
        }
        self.bytes.extend_from_slice(data);
        true
    }

    /// Raises the capacity to at least `capacity`, preserving contents.
    ///
    /// Never shrinks. On allocation failure the buffer is left exactly as it
    /// was.
    pub fn grow_to(&mut self, capacity: usize) -> Result<(), BufferError> {
        if capacity <= self.capacity {
            return Ok(());
        }
        self.bytes
            .try_reserve_exact(capacity - self.bytes.len())
            .map_err(|_| BufferError::Allocation {
                requested: capacity,
            })?;
        self.capacity = capacity;
        Ok(())
    }

    /// Frees the backing memory; capacity drops to zero.
    pub fn release(&mut self) {
        self.bytes = Vec::new();
        self.capacity = 0;
    }
}

// ─── FrameBuffers ───────────────────────────────────────────────────────────

/// The raw/encoded buffer pair used by the sender.
///
/// Invariant after every successful growth:
/// `encoded.capacity() >= max_encoded_len(raw.capacity())`, so encoding a
/// frame that fits the raw buffer can never run out of space.
#[derive(Debug, Default)]
pub struct FrameBuffers {
    raw: FrameBuffer,
    encoded: FrameBuffer,
}

impl FrameBuffers {
    /// Unallocated buffers; memory is reserved on the first frame.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&self) -> &FrameBuffer {
        &self.raw
    }

    pub fn encoded(&self) -> &FrameBuffer {
        &self.encoded
    }

    /// Grows both buffers if a frame of `frame_len` bytes does not fit the
    /// raw buffer. Returns whether growth happened.
    ///
    /// The encoded buffer grows first: if the raw buffer then fails to grow,
    /// the capacity invariant still holds and neither buffer loses data.
    pub fn ensure_capacity(&mut self, frame_len: usize) -> Result<bool, BufferError> {
        if frame_len <= self.raw.capacity() {
            return Ok(false);
        }
        let raw_capacity = frame_len
            .checked_mul(2)
            .ok_or(BufferError::CapacityOverflow { frame_len })?;
        let encoded_capacity = raw_capacity
            .checked_mul(2)
            .and_then(|n| n.checked_add(2))
            .ok_or(BufferError::CapacityOverflow { frame_len })?;

        self.encoded.grow_to(encoded_capacity)?;
        self.raw.grow_to(raw_capacity)?;
        debug!(frame_len, raw_capacity, encoded_capacity, "frame buffers grown");
        debug_assert!(self.encoded.capacity() >= max_encoded_len(self.raw.capacity()));
        Ok(true)
    }

    /// Copies `frame` into the raw buffer, growing first if required.
    ///
    /// Returns whether the buffers had to grow.
    pub fn load(&mut self, frame: &[u8]) -> Result<bool, BufferError> {
        let grown = self.ensure_capacity(frame.len())?;
        self.raw.clear();
        let copied = self.raw.extend_from_slice(frame);
        debug_assert!(copied, "raw buffer sized for the frame");
        Ok(grown)
    }

    /// Encodes the raw buffer into the (cleared) encoded buffer and returns
    /// the wire bytes.
    pub fn encode(&mut self) -> Result<&[u8], CodecError> {
        self.encoded.clear();
        codec::encode(self.raw.as_slice(), &mut self.encoded)?;
        Ok(self.encoded.as_slice())
    }

    /// Releases both buffers.
    pub fn release(&mut self) {
        self.raw.release();
        self.encoded.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{END, ESCAPE, START};

    #[test]
    fn push_respects_capacity() {
        let mut buf = FrameBuffer::with_capacity(2).unwrap();
        assert!(buf.push(1));
        assert!(buf.push(2));
        assert!(!buf.push(3));
        assert_eq!(buf.as_slice(), &[1, 2]);
    }

    #[test]
    fn extend_is_all_or_nothing() {
        let mut buf = FrameBuffer::with_capacity(4).unwrap();
        assert!(buf.extend_from_slice(&[1, 2, 3]));
        assert!(!buf.extend_from_slice(&[4, 5]));
        assert_eq!(buf.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn grow_preserves_contents_and_never_shrinks() {
        let mut buf = FrameBuffer::with_capacity(4).unwrap();
        buf.extend_from_slice(b"abcd");
        buf.grow_to(64).unwrap();
        assert_eq!(buf.capacity(), 64);
        assert_eq!(buf.as_slice(), b"abcd");

        buf.grow_to(8).unwrap();
        assert_eq!(buf.capacity(), 64);
    }

    #[test]
    fn huge_growth_fails_without_damage() {
        let mut buf = FrameBuffer::with_capacity(8).unwrap();
        buf.extend_from_slice(b"keep");
        let err = buf.grow_to(usize::MAX).unwrap_err();
        assert_eq!(
            err,
            BufferError::Allocation {
                requested: usize::MAX
            }
        );
        assert_eq!(buf.capacity(), 8);
        assert_eq!(buf.as_slice(), b"keep");
    }

    #[test]
    fn buffers_start_unallocated() {
        let bufs = FrameBuffers::new();
        assert_eq!(bufs.raw().capacity(), 0);
        assert_eq!(bufs.encoded().capacity(), 0);
    }

    #[test]
    fn load_grows_to_twice_frame_size() {
        let mut bufs = FrameBuffers::new();
        let frame = vec![0xAA; 100];
        assert!(bufs.load(&frame).unwrap());
        assert!(bufs.raw().capacity() >= 200);
        assert!(bufs.encoded().capacity() >= 2 * 200 + 2);
        assert_eq!(bufs.raw().as_slice(), &frame[..]);

        // Larger than the first frame but within capacity: no second growth.
        let bigger = vec![0xBB; 150];
        let capacity = bufs.raw().capacity();
        assert!(!bufs.load(&bigger).unwrap());
        assert_eq!(bufs.raw().len(), 150);
        assert_eq!(bufs.raw().capacity(), capacity);
        assert_eq!(bufs.raw().as_slice(), &bigger[..]);
    }

    #[test]
    fn growth_keeps_unrelated_encoded_frame() {
        let mut bufs = FrameBuffers::new();
        bufs.load(b"small").unwrap();
        let previous = bufs.encode().unwrap().to_vec();

        bufs.ensure_capacity(10_000).unwrap();
        assert!(bufs.raw().capacity() >= 20_000);
        assert!(bufs.encoded().capacity() >= 40_002);
        assert_eq!(bufs.encoded().as_slice(), &previous[..]);
        assert_eq!(bufs.raw().as_slice(), b"small");
    }

    #[test]
    fn overflowing_frame_len_is_rejected() {
        let mut bufs = FrameBuffers::new();
        let err = bufs.ensure_capacity(usize::MAX / 2 + 1).unwrap_err();
        assert!(matches!(err, BufferError::CapacityOverflow { .. }));
        assert_eq!(bufs.raw().capacity(), 0);
    }

    #[test]
    fn worst_case_frame_always_encodes() {
        let mut bufs = FrameBuffers::new();
        let frame: Vec<u8> = [START, END, ESCAPE].repeat(50);
        bufs.load(&frame).unwrap();
        let encoded = bufs.encode().unwrap();
        assert_eq!(encoded.len(), frame.len() * 2 + 2);
    }

    #[test]
    fn encode_resets_previous_output() {
        let mut bufs = FrameBuffers::new();
        bufs.load(b"first frame").unwrap();
        bufs.encode().unwrap();
        bufs.load(b"2nd").unwrap();
        assert_eq!(bufs.encode().unwrap(), &[START, b'2', b'n', b'd', END]);
    }

    #[test]
    fn release_frees_both() {
        let mut bufs = FrameBuffers::new();
        bufs.load(b"data").unwrap();
        bufs.release();
        assert_eq!(bufs.raw().capacity(), 0);
        assert_eq!(bufs.encoded().capacity(), 0);
        assert!(bufs.raw().is_empty());
    }
}
