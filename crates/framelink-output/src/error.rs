//! Error types for the output worker.
//!
//! Only name-resolution "try again" answers are retried. Everything below
//! ends the session; the worker never reconnects on its own.

use std::io;
use std::net::SocketAddr;

use framelink_transport::buffer::BufferError;
use framelink_transport::codec::CodecError;
use thiserror::Error;

use crate::config::{AddressFamily, ConfigError};

// ── Session ─────────────────────────────────────────────────────────

/// A condition that ends one worker session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to resolve '{host}': {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("'{host}' has no {family} address")]
    AddressFamily { host: String, family: AddressFamily },
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn connect thread: {0}")]
    ConnectSpawn(#[source] io::Error),
    #[error("connect thread ended without a result")]
    ConnectAborted,
    #[error("receiver closed the connection")]
    PeerClosed,
    #[error("failed to read acknowledgments: {0}")]
    AckRead(#[source] io::Error),
    #[error("failed to send frame: {0}")]
    Send(#[source] io::Error),
    #[error("short write: {written} of {expected} bytes accepted")]
    ShortWrite { written: usize, expected: usize },
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The frame source was closed; the session ends normally.
    #[error("frame source closed")]
    SourceClosed,
    /// A stop request arrived.
    #[error("cancelled")]
    Cancelled,
}

impl SessionError {
    /// Whether this is a normal end of session rather than a failure.
    pub fn is_clean(&self) -> bool {
        matches!(self, SessionError::SourceClosed | SessionError::Cancelled)
    }
}

// ── Start ───────────────────────────────────────────────────────────

/// Failure to start a worker.
#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}
