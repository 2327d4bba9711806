//! # Frame Sources
//!
//! A frame source is a single shared slot that a producer keeps overwriting
//! with its latest frame. Consumers wait for a newer generation than the one
//! they last read and copy the frame out while holding the lock. A consumer
//! that falls behind simply skips the frames it missed.
//!
//! The lock is held only for the copy; encoding and network I/O happen after
//! it is released.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::cancel::Cancel;

#[derive(Debug, Default)]
struct Slot {
    frame: Vec<u8>,
    /// Bumped on every publish; 0 means nothing published yet.
    generation: u64,
    /// Highest generation a consumer has copied out.
    consumed: u64,
    closed: bool,
}

/// Why no frame was returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchError {
    /// A stop request arrived while waiting.
    Cancelled,
    /// The producer closed the source and every frame has been read.
    Closed,
}

/// A frame copied out of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fetched<R> {
    /// Generation of the frame that was read.
    pub generation: u64,
    /// Frames published since the previous read that were never read.
    pub skipped: u64,
    /// Whatever the copy closure returned.
    pub value: R,
}

/// Latest-frame slot shared between one producer and its consumers.
#[derive(Debug)]
pub struct FrameSource {
    name: String,
    slot: Mutex<Slot>,
    changed: Condvar,
}

impl FrameSource {
    pub fn new(name: impl Into<String>) -> Self {
        FrameSource {
            name: name.into(),
            slot: Mutex::new(Slot::default()),
            changed: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the current frame and wakes waiting consumers. Returns the
    /// new frame's generation.
    pub fn publish(&self, frame: &[u8]) -> u64 {
        let mut slot = self.lock();
        slot.frame.clear();
        slot.frame.extend_from_slice(frame);
        slot.generation += 1;
        let generation = slot.generation;
        drop(slot);
        self.changed.notify_all();
        generation
    }

    /// Marks the end of the stream. Frames already published can still be
    /// read once.
    pub fn close(&self) {
        self.lock().closed = true;
        self.changed.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Generation of the latest published frame.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Wakes every waiter so it can re-check its cancellation flag.
    pub fn wake(&self) {
        let _slot = self.lock();
        self.changed.notify_all();
    }

    /// Blocks until a frame newer than `last_seen` is available, then calls
    /// `copy` with it while the lock is held.
    pub fn next_frame<R>(
        &self,
        last_seen: u64,
        cancel: &Cancel,
        copy: impl FnOnce(&[u8]) -> R,
    ) -> Result<Fetched<R>, FetchError> {
        let mut slot = self.lock();
        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            if slot.generation > last_seen {
                break;
            }
            if slot.closed {
                return Err(FetchError::Closed);
            }
            slot = self
                .changed
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }

        let value = copy(&slot.frame);
        let generation = slot.generation;
        slot.consumed = slot.consumed.max(generation);
        drop(slot);
        self.changed.notify_all();

        Ok(Fetched {
            generation,
            skipped: generation - last_seen - 1,
            value,
        })
    }

    /// Blocks until a consumer has read `generation` (or anything newer),
    /// the source is closed, or `timeout` passes. Returns whether it was read.
    pub fn wait_consumed(&self, generation: u64, timeout: Duration) -> bool {
        let slot = self.lock();
        let (slot, _) = self
            .changed
            .wait_timeout_while(slot, timeout, |s| s.consumed < generation && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        slot.consumed >= generation
    }
}

/// The ordered set of frame sources an output can read from.
#[derive(Debug, Clone, Default)]
pub struct FrameSources {
    sources: Vec<Arc<FrameSource>>,
}

impl FrameSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a source and returns its index.
    pub fn add(&mut self, source: Arc<FrameSource>) -> usize {
        self.sources.push(source);
        self.sources.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&Arc<FrameSource>> {
        self.sources.get(index)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl FromIterator<Arc<FrameSource>> for FrameSources {
    fn from_iter<T: IntoIterator<Item = Arc<FrameSource>>>(iter: T) -> Self {
        FrameSources {
            sources: iter.into_iter().collect(),
        }
    }
}
