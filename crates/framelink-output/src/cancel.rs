use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{bounded, Receiver, Sender};

/// Stop request shared between a worker and whoever may stop it.
///
/// Loops check [`is_cancelled`](Self::is_cancelled) between blocking calls.
/// Waits that cannot poll select on [`signal`](Self::signal) instead, which
/// disconnects the moment the request is made.
#[derive(Debug, Clone)]
pub struct Cancel {
    flag: Arc<AtomicBool>,
    trigger: Arc<Mutex<Option<Sender<()>>>>,
    signal: Receiver<()>,
}

impl Default for Cancel {
    fn default() -> Self {
        let (trigger, signal) = bounded(0);
        Cancel {
            flag: Arc::new(AtomicBool::new(false)),
            trigger: Arc::new(Mutex::new(Some(trigger))),
            signal,
        }
    }
}

impl Cancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        // Dropping the only sender disconnects every clone of the signal.
        self.trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Never receives a message; becomes ready (disconnected) on cancel.
    pub fn signal(&self) -> &Receiver<()> {
        &self.signal
    }
}
