//! # framelink-transport
//!
//! Pure-logic half of framelink: no sockets, no threads.
//!
//! A frame is byte-stuffed between start/end markers so that boundaries
//! survive arbitrary payload content and partial reads. The receiver answers
//! every consumed frame with one ack byte, and the sender never keeps more
//! than a fixed window of frames unacknowledged.
//!
//! ## Crate structure
//!
//! - [`wire`] — Marker bytes, escape codes, protocol defaults
//! - [`codec`] — Frame encoder and self-synchronising decoder
//! - [`buffer`] — Growable raw/encoded frame buffers
//! - [`window`] — Credit window (sent vs confirmed counters)
//! - [`stats`] — Sender statistics

pub mod buffer;
pub mod codec;
pub mod stats;
pub mod window;
pub mod wire;
