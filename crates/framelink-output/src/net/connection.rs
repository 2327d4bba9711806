//! # Connection Manager
//!
//! Resolves the receiver, connects, and tracks the connection in a
//! [`ConnectionSlot`] shared with whoever may stop the session.
//!
//! ```text
//!   Unresolved ──▶ Resolving ──▶ Connected ──▶ Closed
//!        │             │                         ▲
//!        └─────────────┴──────── close() ────────┘
//! ```
//!
//! Closing shuts the socket down, which unblocks a worker sitting in a read
//! or write on its own handle to the same socket. Once closed, a slot never
//! reopens: a connect that completes after a stop request is torn down
//! immediately.

use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use crossbeam_channel::{bounded, select};
use tracing::{debug, info, warn};

use crate::cancel::Cancel;
use crate::config::Target;
use crate::error::SessionError;
use crate::net::resolve::{ResolveError, Resolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unresolved,
    Resolving,
    Connected,
    Closed,
}

#[derive(Debug)]
struct SlotInner {
    state: ConnectionState,
    peer: Option<SocketAddr>,
    stream: Option<TcpStream>,
}

/// Shared view of one session's connection.
#[derive(Debug)]
pub struct ConnectionSlot {
    inner: Mutex<SlotInner>,
}

impl Default for ConnectionSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionSlot {
    pub fn new() -> Self {
        ConnectionSlot {
            inner: Mutex::new(SlotInner {
                state: ConnectionState::Unresolved,
                peer: None,
                stream: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Address of the connected receiver, if any.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.lock().peer
    }

    /// Moves to `Resolving`. Fails if the slot has already been closed.
    fn begin_resolving(&self) -> Result<(), SessionError> {
        let mut inner = self.lock();
        if inner.state == ConnectionState::Closed {
            return Err(SessionError::Cancelled);
        }
        inner.state = ConnectionState::Resolving;
        Ok(())
    }

    /// Registers a freshly connected stream. If the slot was closed in the
    /// meantime the stream is shut down and the session is cancelled.
    fn attach(&self, peer: SocketAddr, stream: &TcpStream) -> Result<(), SessionError> {
        let mut inner = self.lock();
        if inner.state == ConnectionState::Closed {
            let _ = stream.shutdown(Shutdown::Both);
            return Err(SessionError::Cancelled);
        }
        let handle = stream.try_clone().map_err(|source| SessionError::Connect {
            addr: peer,
            source,
        })?;
        inner.stream = Some(handle);
        inner.peer = Some(peer);
        inner.state = ConnectionState::Connected;
        Ok(())
    }

    /// Shuts the socket down and forgets the resolved address.
    ///
    /// Idempotent and safe in any state. Returns `true` only for the call
    /// that actually closed the slot.
    pub fn close(&self) -> bool {
        let mut inner = self.lock();
        if inner.state == ConnectionState::Closed {
            return false;
        }
        if let Some(stream) = inner.stream.take() {
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                debug!(error = %e, "socket shutdown");
            }
        }
        inner.peer = None;
        inner.state = ConnectionState::Closed;
        true
    }
}

/// Resolves `target`, connects, and registers the stream in `slot`.
///
/// Resolution and `connect` run on a helper thread so that a stop request
/// returns [`SessionError::Cancelled`] at once instead of waiting out a slow
/// lookup or connect. A stream that completes after that is dropped unseen.
///
/// Transient resolution failures are retried immediately, without bound,
/// until the lookup settles or `cancel` is set. Any other failure is fatal.
pub fn establish(
    target: &Target,
    resolver: Arc<dyn Resolver>,
    slot: &ConnectionSlot,
    cancel: &Cancel,
) -> Result<TcpStream, SessionError> {
    slot.begin_resolving()?;

    let (done_tx, done_rx) = bounded(1);
    {
        let target = target.clone();
        let cancel = cancel.clone();
        thread::Builder::new()
            .name("framelink-connect".into())
            .spawn(move || {
                let _ = done_tx.send(resolve_and_connect(&target, resolver.as_ref(), &cancel));
            })
            .map_err(SessionError::ConnectSpawn)?;
    }

    let (addr, stream) = select! {
        recv(done_rx) -> outcome => outcome.map_err(|_| SessionError::ConnectAborted)??,
        recv(cancel.signal()) -> _ => {
            debug!(host = %target.host, "stop requested while connecting");
            return Err(SessionError::Cancelled);
        }
    };
    slot.attach(addr, &stream)?;
    info!(%addr, "connected to receiver");
    Ok(stream)
}

fn resolve_and_connect(
    target: &Target,
    resolver: &dyn Resolver,
    cancel: &Cancel,
) -> Result<(SocketAddr, TcpStream), SessionError> {
    let mut attempts = 0u64;
    let addrs = loop {
        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        attempts += 1;
        match resolver.resolve(&target.host, target.port) {
            Ok(addrs) => break addrs,
            Err(ResolveError::Transient(e)) => {
                if attempts == 1 {
                    warn!(host = %target.host, error = %e, "name service unavailable, retrying");
                }
            }
            Err(ResolveError::Fatal(source)) => {
                return Err(SessionError::Resolve {
                    host: target.host.clone(),
                    source,
                })
            }
        }
    };

    let mut addr = addrs
        .into_iter()
        .find(|a| target.family.matches(a))
        .ok_or_else(|| SessionError::AddressFamily {
            host: target.host.clone(),
            family: target.family,
        })?;
    addr.set_port(target.port);
    debug!(host = %target.host, %addr, attempts, "receiver resolved");

    if cancel.is_cancelled() {
        return Err(SessionError::Cancelled);
    }
    let stream =
        TcpStream::connect(addr).map_err(|source| SessionError::Connect { addr, source })?;
    Ok((addr, stream))
}
