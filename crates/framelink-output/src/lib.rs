//! # framelink-output
//!
//! Streams frames from a [`source::FrameSource`] to one TCP receiver using
//! the framelink wire format, never keeping more than a configured window
//! of frames unacknowledged.
//!
//! ## Crate structure
//!
//! - [`config`] — CLI/TOML options and validation
//! - [`source`] — Latest-frame slots shared with producers
//! - [`net`] — Name resolution and the receiver connection
//! - [`sender`] — Credit-gated send loop
//! - [`worker`] — Background session with one-shot cleanup
//!
//! ```no_run
//! use std::sync::Arc;
//! use framelink_output::config::OutputConfig;
//! use framelink_output::source::{FrameSource, FrameSources};
//! use framelink_output::worker::OutputWorker;
//!
//! let camera = Arc::new(FrameSource::new("camera"));
//! let sources: FrameSources = std::iter::once(camera.clone()).collect();
//! let mut worker = OutputWorker::start(&OutputConfig::new("receiver.local"), &sources)?;
//! camera.publish(b"frame bytes");
//! // ...
//! worker.stop();
//! # Ok::<(), framelink_output::error::StartError>(())
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod net;
pub mod sender;
pub mod source;
pub mod worker;
