// src/worker.rs

//! Background workers
//!
//! Long-running operations (metadata fetches, downloads, native installs,
//! batch update checks) run on their own thread. Each launched task delivers
//! exactly one completion value over a channel. Progress and cancellation
//! are separate, optional side channels.

use crate::error::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Progress events emitted by an install flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// Bytes received so far out of the advertised total; never decreases
    Downloading { received: u64, total: u64 },
    /// Artifact handed to the native tool; no longer cancellable
    Installing { artifact: String },
}

/// Sending half for progress events
pub type ProgressSink = Sender<Progress>;

/// Send a progress event, ignoring a receiver that went away
pub(crate) fn report(sink: Option<&ProgressSink>, event: Progress) {
    if let Some(sink) = sink {
        let _ = sink.send(event);
    }
}

/// Cooperative cancellation flag shared between a caller and a worker
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Re-arm after a cancelled operation
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Handle to a background operation
pub struct Task<T> {
    label: String,
    done: Receiver<Result<T>>,
}

impl<T> Task<T> {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Block until the operation completes
    ///
    /// A worker that panicked, and so never reported, yields an error.
    pub fn wait(self) -> Result<T> {
        match self.done.recv() {
            Ok(result) => result,
            Err(_) => Err(worker_died(&self.label)),
        }
    }

    /// Wait up to `timeout`; `None` means still running
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        match self.done.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(worker_died(&self.label))),
        }
    }
}

fn worker_died(label: &str) -> Error {
    warn!("Worker '{}' exited without reporting a result", label);
    Error::InitError(format!("background task '{}' terminated unexpectedly", label))
}

/// Run `f` on a dedicated thread
pub fn spawn<T, F>(label: &str, f: F) -> Task<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let name = label.to_string();

    debug!("Spawning worker '{}'", name);
    let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
        let result = f();
        // The receiver may already be gone if the caller stopped waiting
        let _ = tx.send(result);
    });

    if let Err(e) = spawned {
        warn!("Failed to spawn worker '{}': {}", name, e);
    }

    Task { label: name, done: rx }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_delivers_value() {
        let task = spawn("answer", || Ok(42));
        assert_eq!(task.label(), "answer");
        assert_eq!(task.wait().unwrap(), 42);
    }

    #[test]
    fn test_task_delivers_error() {
        let task: Task<()> = spawn("fails", || Err(Error::NotFoundError("x".into())));
        assert!(matches!(task.wait(), Err(Error::NotFoundError(_))));
    }

    #[test]
    fn test_panicking_worker_becomes_error() {
        let task: Task<()> = spawn("panics", || panic!("boom"));
        assert!(task.wait().is_err());
    }

    #[test]
    fn test_wait_timeout_while_running() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let task = spawn("blocked", move || {
            let _ = release_rx.recv();
            Ok("done")
        });

        assert!(task.wait_timeout(Duration::from_millis(20)).is_none());
        release_tx.send(()).unwrap();
        assert_eq!(task.wait().unwrap(), "done");
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
        clone.reset();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_report_without_receiver() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        report(Some(&tx), Progress::Installing { artifact: "a.deb".into() });
        report(None, Progress::Downloading { received: 1, total: 2 });
    }
}
