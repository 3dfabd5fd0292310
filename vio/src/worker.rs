/*!
    Pipeline worker threads.
*/

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use vio_types::{Error, Result};

#[derive(Debug, Default)]
struct CancelState {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

/**
    Shared stop signal with interruptible waits.
*/
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        *self.state.cancelled.lock() = true;
        self.state.signal.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.cancelled.lock()
    }

    /**
        Wait for `duration`. Returns false if cancelled before or during the
        wait.
    */
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut cancelled = self.state.cancelled.lock();
        while !*cancelled {
            if self.state.signal.wait_until(&mut cancelled, deadline).timed_out() {
                return !*cancelled;
            }
        }
        false
    }
}

/// Signals the owner when the worker returns or unwinds.
struct DoneGuard(Sender<()>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

/**
    A named worker thread that can be joined with a deadline.
*/
pub(crate) struct Worker {
    name: String,
    handle: Option<JoinHandle<()>>,
    done: Receiver<()>,
}

impl Worker {
    pub fn spawn<F>(name: &str, f: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (done_tx, done) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _done = DoneGuard(done_tx);
                f();
            })
            .map_err(|e| Error::resource(format!("cannot spawn {name}: {e}")))?;

        Ok(Self {
            name: name.to_string(),
            handle: Some(handle),
            done,
        })
    }

    /**
        Wait up to `grace` for the thread to finish.

        Returns false if it is still running, in which case it is detached
        and releases its resources itself once its current call returns.
    */
    pub fn join(&mut self, grace: Duration) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };

        match self.done.recv_timeout(grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    warn!(worker = %self.name, "worker panicked");
                }
                debug!(worker = %self.name, "worker joined");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    worker = %self.name,
                    grace_ms = grace.as_millis() as u64,
                    "worker still busy after grace period, detaching"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("running", &self.handle.is_some())
            .finish()
    }
}
