//! # Frame Codec
//!
//! Byte-stuffing encoder and a single-byte-at-a-time decoder for the
//! framelink wire format (see [`crate::wire`]).
//!
//! The encoder is stateless and writes into a capacity-bounded
//! [`FrameBuffer`]. The decoder is a small state machine that never reports
//! errors: malformed escapes, truncated frames and oversized frames are
//! dropped and the decoder waits for the next start marker. A single corrupt
//! byte therefore costs at most the frame it landed in.

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use thiserror::Error;
use tracing::trace;

use crate::buffer::FrameBuffer;
use crate::wire::{escape_code, unescape_code, END, ESCAPE, START};

// ─── Encoder ────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The destination buffer ran out of space mid-frame.
    #[error("encoded frame does not fit in {capacity} bytes")]
    InsufficientCapacity { capacity: usize },
}

#[inline]
fn put(dst: &mut FrameBuffer, byte: u8) -> Result<(), CodecError> {
    if dst.push(byte) {
        Ok(())
    } else {
        Err(CodecError::InsufficientCapacity {
            capacity: dst.capacity(),
        })
    }
}

/// Appends the start marker.
pub fn start(dst: &mut FrameBuffer) -> Result<(), CodecError> {
    put(dst, START)
}

/// Appends `payload`, escaping every reserved byte.
pub fn append(dst: &mut FrameBuffer, payload: &[u8]) -> Result<(), CodecError> {
    for &byte in payload {
        match escape_code(byte) {
            Some(code) => {
                put(dst, ESCAPE)?;
                put(dst, code)?;
            }
            None => put(dst, byte)?,
        }
    }
    Ok(())
}

/// Appends the end marker.
pub fn end(dst: &mut FrameBuffer) -> Result<(), CodecError> {
    put(dst, END)
}

/// Encodes one complete frame onto the end of `dst`.
///
/// Returns the number of bytes written. If `dst` fills up, it is truncated
/// back to its length before the call and the error is returned, so a
/// failed encode never leaves half a frame behind.
pub fn encode(payload: &[u8], dst: &mut FrameBuffer) -> Result<usize, CodecError> {
    let mark = dst.len();
    let result = start(dst)
        .and_then(|()| append(dst, payload))
        .and_then(|()| end(dst));
    match result {
        Ok(()) => Ok(dst.len() - mark),
        Err(e) => {
            dst.truncate(mark);
            Err(e)
        }
    }
}

/// Exact encoded size of `payload`, markers included.
pub fn encoded_len(payload: &[u8]) -> usize {
    let escaped = payload
        .iter()
        .filter(|&&b| escape_code(b).is_some())
        .count();
    payload.len() + escaped + 2
}

/// Encodes `payload` into a freshly allocated buffer.
pub fn encode_to_bytes(payload: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(encoded_len(payload));
    out.extend_from_slice(&[START]);
    for &byte in payload {
        match escape_code(byte) {
            Some(code) => out.extend_from_slice(&[ESCAPE, code]),
            None => out.extend_from_slice(&[byte]),
        }
    }
    out.extend_from_slice(&[END]);
    out.freeze()
}

// ─── Decoder ────────────────────────────────────────────────────────────────

/// Result of feeding one byte to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStep {
    /// No frame finished on this byte.
    Pending,
    /// A frame just finished; its payload is available via
    /// [`FrameDecoder::frame`] until the next start marker.
    Complete,
}

/// Counters for what the decoder has seen, including recovered corruption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecoderStats {
    /// Frames completed successfully.
    pub frames: u64,
    /// Partial frames dropped: bad escape code, end marker mid-escape, or a
    /// start marker arriving inside an open frame.
    pub discarded: u64,
    /// Frames dropped for exceeding the size limit.
    pub overflows: u64,
    /// Bytes ignored outside of any frame.
    pub ignored: u64,
}

/// Default upper bound on a decoded payload (16 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Self-synchronising frame decoder.
#[derive(Debug)]
pub struct FrameDecoder {
    started: bool,
    escaping: bool,
    acc: BytesMut,
    max_frame_len: usize,
    stats: DecoderStats,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl FrameDecoder {
    /// A decoder that drops any frame whose payload exceeds `max_frame_len`.
    pub fn new(max_frame_len: usize) -> Self {
        FrameDecoder {
            started: false,
            escaping: false,
            acc: BytesMut::with_capacity(max_frame_len.min(4096)),
            max_frame_len,
            stats: DecoderStats::default(),
        }
    }

    /// Whether a frame is currently open.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Whether the previous byte was an escape marker.
    pub fn is_escaping(&self) -> bool {
        self.escaping
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Payload accumulated so far; after [`DecodeStep::Complete`] this is the
    /// completed frame.
    pub fn frame(&self) -> &[u8] {
        &self.acc
    }

    /// Takes the accumulated payload, leaving the accumulator empty.
    pub fn take_frame(&mut self) -> Bytes {
        self.acc.split().freeze()
    }

    fn reset(&mut self) {
        self.started = false;
        self.escaping = false;
        self.acc.clear();
    }

    fn append_or_reset(&mut self, byte: u8) {
        if self.acc.len() >= self.max_frame_len {
            trace!(limit = self.max_frame_len, "oversized frame dropped");
            self.stats.overflows += 1;
            self.reset();
            return;
        }
        self.acc.extend_from_slice(&[byte]);
    }

    /// Advances the state machine by one byte.
    pub fn decode_step(&mut self, byte: u8) -> DecodeStep {
        if byte == START {
            if self.started {
                trace!(partial = self.acc.len(), "start marker inside open frame");
                self.stats.discarded += 1;
            }
            self.reset();
            self.started = true;
            return DecodeStep::Pending;
        }
        if !self.started {
            self.stats.ignored += 1;
            return DecodeStep::Pending;
        }

        if byte == END {
            self.started = false;
            if self.escaping {
                trace!("end marker after escape; frame dropped");
                self.stats.discarded += 1;
                self.reset();
                return DecodeStep::Pending;
            }
            self.stats.frames += 1;
            return DecodeStep::Complete;
        }

        if self.escaping {
            self.escaping = false;
            match unescape_code(byte) {
                Some(literal) => self.append_or_reset(literal),
                None => {
                    trace!(code = byte, "invalid escape code; frame dropped");
                    self.stats.discarded += 1;
                    self.reset();
                }
            }
        } else if byte == ESCAPE {
            self.escaping = true;
        } else {
            self.append_or_reset(byte);
        }
        DecodeStep::Pending
    }

    /// Feeds a chunk of the stream, yielding each frame completed within it.
    ///
    /// Bytes after the last completed frame stay buffered for the next call.
    pub fn feed<'a>(&'a mut self, input: &'a [u8]) -> Frames<'a> {
        Frames {
            decoder: self,
            input: input.iter(),
        }
    }
}

/// Iterator over frames completed by one [`FrameDecoder::feed`] call.
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
    input: std::slice::Iter<'a, u8>,
}

impl Iterator for Frames<'_> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        for &byte in self.input.by_ref() {
            if self.decoder.decode_step(byte) == DecodeStep::Complete {
                return Some(self.decoder.take_frame());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{ESCAPED_END, ESCAPED_ESCAPE, ESCAPED_START};

    fn encode_vec(payload: &[u8]) -> Vec<u8> {
        let capacity = crate::wire::max_encoded_len(payload.len());
        let mut dst = FrameBuffer::with_capacity(capacity).unwrap();
        encode(payload, &mut dst).unwrap();
        dst.as_slice().to_vec()
    }

    fn decode_all(stream: &[u8]) -> Vec<Bytes> {
        FrameDecoder::default().feed(stream).collect()
    }

    #[test]
    fn reserved_bytes_are_escaped() {
        let encoded = encode_vec(&[START, END, ESCAPE]);
        assert_eq!(
            encoded,
            vec![
                START,
                ESCAPE,
                ESCAPED_START,
                ESCAPE,
                ESCAPED_END,
                ESCAPE,
                ESCAPED_ESCAPE,
                END
            ]
        );
        assert_eq!(encoded.len(), 8);
    }

    #[test]
    fn empty_payload_is_two_markers() {
        assert_eq!(encode_vec(&[]), vec![START, END]);
        let frames = decode_all(&[START, END]);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_empty());
    }

    #[test]
    fn plain_payload_passes_through() {
        assert_eq!(encode_vec(b"abc"), vec![START, b'a', b'b', b'c', END]);
    }

    #[test]
    fn encode_appends_after_existing_bytes() {
        let mut dst = FrameBuffer::with_capacity(16).unwrap();
        encode(b"a", &mut dst).unwrap();
        let written = encode(&[START], &mut dst).unwrap();
        assert_eq!(written, 4);
        assert_eq!(
            dst.as_slice(),
            &[START, b'a', END, START, ESCAPE, ESCAPED_START, END]
        );
    }

    #[test]
    fn exhausted_destination_discards_partial_output() {
        let mut dst = FrameBuffer::with_capacity(6).unwrap();
        encode(b"x", &mut dst).unwrap();
        let err = encode(&[ESCAPE, ESCAPE], &mut dst).unwrap_err();
        assert_eq!(err, CodecError::InsufficientCapacity { capacity: 6 });
        assert_eq!(dst.as_slice(), &[START, b'x', END]);
    }

    #[test]
    fn encoded_len_matches_encoder() {
        let payload = [0x00, START, 0x10, END, ESCAPE, 0xFF];
        assert_eq!(encoded_len(&payload), encode_vec(&payload).len());
        assert_eq!(&encode_to_bytes(&payload)[..], &encode_vec(&payload)[..]);
    }

    #[test]
    fn stream_start_garbage_is_ignored() {
        let mut dec = FrameDecoder::default();
        let frames: Vec<_> = dec.feed(&[0xFF, END, ESCAPE, START, b'a', END]).collect();
        assert_eq!(frames, vec![Bytes::from_static(b"a")]);
        assert_eq!(dec.stats().ignored, 3);
    }

    #[test]
    fn restart_inside_frame_resynchronises() {
        let frames = decode_all(&[START, 0xFF, START, b'A', b'B', END]);
        assert_eq!(frames, vec![Bytes::from_static(b"AB")]);
    }

    #[test]
    fn malformed_escape_drops_partial_frame() {
        let mut dec = FrameDecoder::default();
        let frames: Vec<_> = dec.feed(&[START, ESCAPE, 0xFF, START, b'A', END]).collect();
        assert_eq!(frames, vec![Bytes::from_static(b"A")]);
        assert_eq!(dec.stats().discarded, 1);
        assert_eq!(dec.stats().frames, 1);
    }

    #[test]
    fn end_marker_mid_escape_drops_frame() {
        let mut dec = FrameDecoder::default();
        for &b in &[START, b'q', ESCAPE] {
            assert_eq!(dec.decode_step(b), DecodeStep::Pending);
        }
        assert_eq!(dec.decode_step(END), DecodeStep::Pending);
        assert!(!dec.is_started());
        assert!(!dec.is_escaping());
        // Bytes until the next start marker are ignored.
        assert_eq!(dec.decode_step(b'z'), DecodeStep::Pending);
        assert_eq!(dec.stats().ignored, 1);
    }

    #[test]
    fn bad_escape_then_plain_bytes_are_ignored() {
        let frames = decode_all(&[START, ESCAPE, 0x42, b'x', END, START, b'y', END]);
        assert_eq!(frames, vec![Bytes::from_static(b"y")]);
    }

    #[test]
    fn oversized_frame_is_dropped() {
        let mut dec = FrameDecoder::new(3);
        let frames: Vec<_> = dec
            .feed(&[START, 0x40, 0x41, 0x42, 0x43, END, START, b'o', b'k', END])
            .collect();
        assert_eq!(frames, vec![Bytes::from_static(b"ok")]);
        assert_eq!(dec.stats().overflows, 1);
    }

    #[test]
    fn frame_split_across_reads() {
        let encoded = encode_vec(&[b'h', START, b'i']);
        let (a, b) = encoded.split_at(3);
        let mut dec = FrameDecoder::default();
        assert_eq!(dec.feed(a).count(), 0);
        let frames: Vec<_> = dec.feed(b).collect();
        assert_eq!(frames, vec![Bytes::from(vec![b'h', START, b'i'])]);
    }

    #[test]
    fn completed_frame_readable_until_next_start() {
        let mut dec = FrameDecoder::default();
        for &b in &[START, b'k'] {
            dec.decode_step(b);
        }
        assert_eq!(dec.decode_step(END), DecodeStep::Complete);
        assert_eq!(dec.frame(), b"k");
        dec.decode_step(START);
        assert!(dec.frame().is_empty());
    }

    #[test]
    fn back_to_back_frames() {
        let mut stream = encode_vec(b"one");
        stream.extend(encode_vec(b""));
        stream.extend(encode_vec(&[ESCAPE]));
        let frames = decode_all(&stream);
        assert_eq!(
            frames,
            vec![
                Bytes::from_static(b"one"),
                Bytes::new(),
                Bytes::from(vec![ESCAPE])
            ]
        );
    }
}
