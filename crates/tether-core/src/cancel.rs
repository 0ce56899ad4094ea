//! Cancellation capability for in-flight writes and lookups.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;

/// Something that can be told to stop.
///
/// `cancel` is idempotent and safe to call after the operation settled.
pub trait Cancellable {
    fn cancel(&self);

    fn is_cancelled(&self) -> bool;
}

/// Observer half handed to the commit function.
///
/// Long-running collaborators can poll [`is_aborted`](Self::is_aborted) or
/// race their work against [`until_aborted`](Self::until_aborted). The
/// owning task is also aborted outright, so honoring the signal is a
/// courtesy for work that runs outside the task (blocking threads, remote
/// cancellation).
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// A signal that never fires.
    #[must_use]
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the paired handle is cancelled. Pends forever if the
    /// handle is dropped without cancelling.
    pub async fn aborted(&mut self) {
        if self.rx.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Drive `fut` to completion unless the signal fires first.
    pub async fn until_aborted<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        if self.is_aborted() {
            return None;
        }
        tokio::select! {
            biased;
            () = self.aborted() => None,
            out = fut => Some(out),
        }
    }
}

/// Owner half: flips the signal and aborts the attached task.
#[derive(Debug)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
    task: Mutex<Option<tokio::task::AbortHandle>>,
}

impl AbortHandle {
    #[must_use]
    pub fn new() -> (Self, AbortSignal) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                tx,
                task: Mutex::new(None),
            },
            AbortSignal { rx },
        )
    }

    /// Tie a spawned task to this handle. If the handle was already
    /// cancelled the task is aborted immediately.
    pub fn attach(&self, task: tokio::task::AbortHandle) {
        if self.is_cancelled() {
            task.abort();
            return;
        }
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
    }
}

impl Cancellable for AbortHandle {
    fn cancel(&self) {
        self.tx.send_replace(true);
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}
