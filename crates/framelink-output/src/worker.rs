//! # Output Worker
//!
//! Runs one sender session on a background thread:
//!
//! ```text
//!   resolve ──▶ connect ──▶ [credit ▶ fetch ▶ encode ▶ send]* ──▶ cleanup
//! ```
//!
//! The session ends on the first fatal condition, when the frame source is
//! closed, or on [`OutputWorker::stop`]. There is no reconnection: the
//! surrounding system sees a [`WorkerExit`] and may start a new worker,
//! which begins again from resolution with fresh counters.
//!
//! A session only sends frames published after it started; whatever sat in
//! the source beforehand belongs to an earlier session.
//!
//! Cleanup (closing the connection, freeing the frame buffers) runs exactly
//! once per session whichever way it ends. `stop()` triggers it from the
//! calling thread so a worker blocked in an ack read or a send is released
//! immediately; the worker's own unwind then finds it already done.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use framelink_transport::stats::SenderStats;
use tracing::{debug, error, info, warn};

use crate::cancel::Cancel;
use crate::config::{OutputConfig, Target};
use crate::error::{SessionError, StartError};
use crate::net::{establish, ConnectionSlot, ConnectionState, Resolver, SystemResolver};
use crate::sender::FlowSender;
use crate::source::{FrameSource, FrameSources};

// ─── Exit ───────────────────────────────────────────────────────────────────

/// How a session ended, with the final sender statistics.
#[derive(Debug)]
pub enum WorkerExit {
    /// The frame source was closed and every sent frame was acknowledged.
    Completed(SenderStats),
    /// A stop request ended the session.
    Cancelled(SenderStats),
    /// A fatal condition ended the session.
    Failed {
        error: SessionError,
        stats: SenderStats,
    },
}

impl WorkerExit {
    pub fn stats(&self) -> &SenderStats {
        match self {
            WorkerExit::Completed(stats) | WorkerExit::Cancelled(stats) => stats,
            WorkerExit::Failed { stats, .. } => stats,
        }
    }

    pub fn error(&self) -> Option<&SessionError> {
        match self {
            WorkerExit::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

// ─── Cleanup ────────────────────────────────────────────────────────────────

/// One-shot release of a session's shared resources.
#[derive(Debug)]
pub struct Cleanup {
    done: AtomicBool,
    slot: Arc<ConnectionSlot>,
}

impl Cleanup {
    pub fn new(slot: Arc<ConnectionSlot>) -> Self {
        Cleanup {
            done: AtomicBool::new(false),
            slot,
        }
    }

    /// Closes the connection. Only the first call has any effect; returns
    /// whether this call was it.
    pub fn run(&self) -> bool {
        if self.done.swap(true, Ordering::SeqCst) {
            debug!("resources already cleaned up");
            return false;
        }
        info!("cleaning up resources allocated by worker");
        self.slot.close();
        true
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

// ─── Session ────────────────────────────────────────────────────────────────

/// Everything one session needs, owned by the worker thread.
struct Session {
    target: Target,
    source: Arc<FrameSource>,
    resolver: Arc<dyn Resolver>,
    cancel: Cancel,
    slot: Arc<ConnectionSlot>,
    cleanup: Arc<Cleanup>,
    sender: FlowSender,
}

impl Session {
    fn run(&mut self) -> WorkerExit {
        let established = establish(&self.target, self.resolver.clone(), &self.slot, &self.cancel);
        let reason = match established {
            Ok(mut stream) => self.sender.run(&mut stream, &self.source, &self.cancel),
            Err(e) => e,
        };
        let stats = self.sender.stats().clone();

        // A stop request surfaces as whatever the interrupted call saw.
        if self.cancel.is_cancelled() {
            info!(frames = stats.frames_sent, "worker stopped");
            return WorkerExit::Cancelled(stats);
        }
        match reason {
            SessionError::SourceClosed => {
                info!(frames = stats.frames_sent, "frame source closed, worker done");
                WorkerExit::Completed(stats)
            }
            SessionError::Cancelled => WorkerExit::Cancelled(stats),
            error => {
                error!(%error, frames = stats.frames_sent, "worker session failed");
                WorkerExit::Failed { error, stats }
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.sender.release();
        self.cleanup.run();
    }
}

// ─── OutputWorker ───────────────────────────────────────────────────────────

/// Handle to a running output session.
///
/// Dropping the handle stops the session.
pub struct OutputWorker {
    cancel: Cancel,
    source: Arc<FrameSource>,
    slot: Arc<ConnectionSlot>,
    cleanup: Arc<Cleanup>,
    stats: Arc<Mutex<SenderStats>>,
    exit_rx: Receiver<WorkerExit>,
    handle: Option<thread::JoinHandle<()>>,
}

impl OutputWorker {
    /// Validates `config` against `sources` and starts a session using the
    /// system resolver.
    pub fn start(config: &OutputConfig, sources: &FrameSources) -> Result<Self, StartError> {
        Self::start_with_resolver(config, sources, Arc::new(SystemResolver))
    }

    pub fn start_with_resolver(
        config: &OutputConfig,
        sources: &FrameSources,
        resolver: Arc<dyn Resolver>,
    ) -> Result<Self, StartError> {
        let target = config.validate(sources.len())?;
        let source = sources
            .get(config.input)
            .cloned()
            .ok_or(crate::config::ConfigError::InputOutOfRange {
                index: config.input,
                available: sources.len(),
            })?;
        config.log_summary(source.name());

        let cancel = Cancel::new();
        let slot = Arc::new(ConnectionSlot::new());
        let cleanup = Arc::new(Cleanup::new(slot.clone()));
        let stats = Arc::new(Mutex::new(SenderStats::default()));
        let (exit_tx, exit_rx) = bounded(1);

        let session = Session {
            target,
            source: source.clone(),
            resolver,
            cancel: cancel.clone(),
            slot: slot.clone(),
            cleanup: cleanup.clone(),
            sender: FlowSender::new(config.window)
                .with_shared_stats(stats.clone())
                .starting_after(source.generation()),
        };

        let handle = thread::Builder::new()
            .name("framelink-output".into())
            .spawn(move || worker_main(session, exit_tx))?;

        Ok(OutputWorker {
            cancel,
            source,
            slot,
            cleanup,
            stats,
            exit_rx,
            handle: Some(handle),
        })
    }

    /// Receiver for the session's exit report. Exactly one report is sent.
    pub fn exits(&self) -> &Receiver<WorkerExit> {
        &self.exit_rx
    }

    /// Latest sender statistics.
    pub fn stats(&self) -> SenderStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.slot.state()
    }

    /// Whether cleanup has run for this session.
    pub fn is_cleaned_up(&self) -> bool {
        self.cleanup.is_done()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Waits for the session to end on its own and returns its exit report,
    /// unless it was already taken from [`exits`](Self::exits).
    pub fn wait(&mut self) -> Option<WorkerExit> {
        self.join();
        self.exit_rx.try_recv().ok()
    }

    /// Requests cancellation, releases the connection, and waits for the
    /// worker thread. Idempotent.
    ///
    /// Returns promptly wherever the worker is blocked: resolution and
    /// `connect` are abandoned to their helper thread, reads and writes are
    /// cut off by the socket shutdown, and the frame wait is woken.
    pub fn stop(&mut self) -> Option<WorkerExit> {
        if self.handle.is_some() {
            debug!("stopping output worker");
        }
        self.cancel.cancel();
        self.source.wake();
        self.cleanup.run();
        self.join();
        self.exit_rx.try_recv().ok()
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("output worker panicked");
            }
        }
    }
}

impl Drop for OutputWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_main(mut session: Session, exit_tx: Sender<WorkerExit>) {
    let exit = session.run();
    // Release before reporting so observers never see a finished session
    // with resources still held.
    drop(session);
    let _ = exit_tx.send(exit);
}
