//! # Flow-Controlled Sender
//!
//! Binds the rate of frame transmission to the receiver's acknowledgments.
//!
//! ## Loop
//!
//! 1. **Credit**: while the window is exhausted, block reading ack bytes;
//!    each byte read confirms one frame. EOF or a read error ends the session.
//! 2. **Fetch**: wait for the next frame from the source and copy it into the
//!    raw buffer under the source lock, growing buffers first if needed.
//! 3. **Encode**: raw buffer → encoded buffer.
//! 4. **Transmit**: one write of the whole encoded frame. A short write ends
//!    the session; partial frames are never resumed.
//! 5. **Count**: `sent += 1`.
//!
//! The ack wait has no upper bound. A stalled receiver stalls this loop and
//! nothing else: the source keeps overwriting its slot and the sender picks
//! up whatever is latest once credit returns.
//!
//! The sender borrows the connection; it never opens or closes it.

use std::io::{ErrorKind, Read, Write};
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, PoisonError};

use framelink_transport::buffer::FrameBuffers;
use framelink_transport::stats::SenderStats;
use framelink_transport::window::CreditWindow;
use quanta::Instant;
use tracing::{debug, trace};

use crate::cancel::Cancel;
use crate::error::SessionError;
use crate::source::{FetchError, FrameSource};

/// Size of the scratch buffer for inbound ack bytes.
const ACK_READ_SIZE: usize = 256;

pub struct FlowSender {
    window: CreditWindow,
    buffers: FrameBuffers,
    stats: SenderStats,
    shared_stats: Option<Arc<Mutex<SenderStats>>>,
    last_generation: u64,
    ack_buf: [u8; ACK_READ_SIZE],
}

impl FlowSender {
    pub fn new(window: NonZeroU32) -> Self {
        FlowSender {
            window: CreditWindow::new(window),
            buffers: FrameBuffers::new(),
            stats: SenderStats::new(),
            shared_stats: None,
            last_generation: 0,
            ack_buf: [0; ACK_READ_SIZE],
        }
    }

    /// Publishes a stats snapshot into `handle` after every frame.
    pub fn with_shared_stats(mut self, handle: Arc<Mutex<SenderStats>>) -> Self {
        self.shared_stats = Some(handle);
        self
    }

    /// Treats every frame up to `generation` as already seen, so the first
    /// frame sent is one published after this point.
    pub fn starting_after(mut self, generation: u64) -> Self {
        self.last_generation = generation;
        self
    }

    pub fn window(&self) -> &CreditWindow {
        &self.window
    }

    pub fn buffers(&self) -> &FrameBuffers {
        &self.buffers
    }

    pub fn stats(&self) -> &SenderStats {
        &self.stats
    }

    /// Blocks until the window has room for one more frame.
    pub fn wait_for_credit<C: Read>(&mut self, conn: &mut C) -> Result<(), SessionError> {
        if self.window.can_send() {
            return Ok(());
        }
        self.stats.window_stalls += 1;
        debug!(
            sent = self.window.sent(),
            confirmed = self.window.confirmed(),
            "window exhausted, waiting for acks"
        );
        let started = Instant::now();

        while !self.window.can_send() {
            let n = match conn.read(&mut self.ack_buf) {
                Ok(0) => return Err(SessionError::PeerClosed),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(SessionError::AckRead(e)),
            };
            self.window.on_acks(n);
            self.stats.acks_received += n as u64;
            trace!(acks = n, confirmed = self.window.confirmed(), "acks received");
        }

        self.stats.stall_time_us += started.elapsed().as_micros() as u64;
        Ok(())
    }

    /// Copies the next frame from `source` into the raw buffer.
    pub fn fetch_frame(
        &mut self,
        source: &FrameSource,
        cancel: &Cancel,
    ) -> Result<(), SessionError> {
        let buffers = &mut self.buffers;
        let fetched = source
            .next_frame(self.last_generation, cancel, |frame| {
                buffers.load(frame).map(|grown| (grown, frame.len()))
            })
            .map_err(|e| match e {
                FetchError::Cancelled => SessionError::Cancelled,
                FetchError::Closed => SessionError::SourceClosed,
            })?;
        let (grown, len) = fetched.value?;

        if grown {
            self.stats.buffer_growths += 1;
        }
        self.stats.frames_skipped += fetched.skipped;
        self.stats.payload_bytes += len as u64;
        self.last_generation = fetched.generation;
        Ok(())
    }

    /// Encodes the raw buffer and writes it out in a single write.
    pub fn transmit<C: Write>(&mut self, conn: &mut C) -> Result<(), SessionError> {
        let encoded = self.buffers.encode()?;
        let expected = encoded.len();
        let written = loop {
            match conn.write(encoded) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(SessionError::Send(e)),
            }
        };
        if written != expected {
            return Err(SessionError::ShortWrite { written, expected });
        }

        self.window.on_sent();
        self.stats.frames_sent += 1;
        self.stats.bytes_sent += expected as u64;
        trace!(
            frame = self.window.sent(),
            bytes = expected,
            in_flight = self.window.in_flight(),
            "frame sent"
        );
        self.publish_stats();
        Ok(())
    }

    /// One full iteration: credit, fetch, encode, transmit.
    pub fn send_next<C: Read + Write>(
        &mut self,
        conn: &mut C,
        source: &FrameSource,
        cancel: &Cancel,
    ) -> Result<(), SessionError> {
        self.wait_for_credit(conn)?;
        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        self.fetch_frame(source, cancel)?;
        self.transmit(conn)
    }

    /// Reads acks until every sent frame is confirmed.
    pub fn drain<C: Read>(&mut self, conn: &mut C) -> Result<(), SessionError> {
        while self.window.in_flight() > 0 {
            let n = match conn.read(&mut self.ack_buf) {
                Ok(0) => return Err(SessionError::PeerClosed),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(SessionError::AckRead(e)),
            };
            self.window.on_acks(n);
            self.stats.acks_received += n as u64;
        }
        Ok(())
    }

    /// Runs until the session ends. Always returns the reason it ended.
    ///
    /// When the source closes, outstanding frames are drained first so a
    /// clean end means the receiver confirmed everything.
    pub fn run<C: Read + Write>(
        &mut self,
        conn: &mut C,
        source: &FrameSource,
        cancel: &Cancel,
    ) -> SessionError {
        let reason = loop {
            if let Err(e) = self.send_next(conn, source, cancel) {
                break e;
            }
        };
        let reason = match reason {
            SessionError::SourceClosed => match self.drain(conn) {
                Ok(()) => SessionError::SourceClosed,
                Err(e) => e,
            },
            other => other,
        };
        self.publish_stats();
        reason
    }

    fn publish_stats(&self) {
        if let Some(shared) = &self.shared_stats {
            *shared.lock().unwrap_or_else(PoisonError::into_inner) = self.stats.clone();
        }
    }

    /// Frees the frame buffers. The sender can still be used afterwards;
    /// buffers are reallocated on the next frame.
    pub fn release(&mut self) {
        self.buffers.release();
    }
}
