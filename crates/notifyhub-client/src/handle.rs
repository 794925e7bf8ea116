//! `AsyncHandle`: the caller-side object returned by `send_async`. Reifies
//! an in-flight send as a task with three output surfaces — a one-shot
//! result channel, a status enum behind a lock, and an ordered callback
//! list — per the source's goroutine+channel+callback model.

use std::sync::Arc;

use notifyhub_common::Receipt;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl HandleStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, HandleStatus::Completed | HandleStatus::Failed | HandleStatus::Cancelled)
    }
}

type SuccessCallback = Box<dyn FnOnce(&Receipt) + Send>;
type FailureCallback = Box<dyn FnOnce(&ClientError) + Send>;
type ProgressCallback = Box<dyn Fn(HandleStatus) + Send>;
type CompleteCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Callbacks {
    on_success: Vec<SuccessCallback>,
    on_failure: Vec<FailureCallback>,
    on_progress: Vec<ProgressCallback>,
    on_complete: Vec<CompleteCallback>,
}

struct Inner {
    message_id: String,
    status: Mutex<HandleStatus>,
    callbacks: Mutex<Callbacks>,
    result_tx: Mutex<Option<oneshot::Sender<Result<Receipt, ClientError>>>>,
    result_rx: Mutex<Option<oneshot::Receiver<Result<Receipt, ClientError>>>>,
}

/// One per `send_async` call. Cloning shares the same underlying task; only
/// one clone can ever successfully call `result()` since the receiver is
/// taken on first use.
#[derive(Clone)]
pub struct AsyncHandle {
    inner: Arc<Inner>,
}

impl AsyncHandle {
    pub(crate) fn new(message_id: impl Into<String>) -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            inner: Arc::new(Inner {
                message_id: message_id.into(),
                status: Mutex::new(HandleStatus::Queued),
                callbacks: Mutex::new(Callbacks::default()),
                result_tx: Mutex::new(Some(tx)),
                result_rx: Mutex::new(Some(rx)),
            }),
        }
    }

    pub fn message_id(&self) -> &str {
        &self.inner.message_id
    }

    pub fn status(&self) -> HandleStatus {
        *self.inner.status.lock()
    }

    pub fn on_success(&self, cb: impl FnOnce(&Receipt) + Send + 'static) {
        self.inner.callbacks.lock().on_success.push(Box::new(cb));
    }

    pub fn on_failure(&self, cb: impl FnOnce(&ClientError) + Send + 'static) {
        self.inner.callbacks.lock().on_failure.push(Box::new(cb));
    }

    pub fn on_progress(&self, cb: impl Fn(HandleStatus) + Send + 'static) {
        self.inner.callbacks.lock().on_progress.push(Box::new(cb));
    }

    pub fn on_complete(&self, cb: impl FnOnce() + Send + 'static) {
        self.inner.callbacks.lock().on_complete.push(Box::new(cb));
    }

    /// Cancels the handle if it is still queued. Returns `false` if the
    /// message has already started processing or reached a terminal state;
    /// an in-flight dispatch is never interrupted by this call.
    pub fn cancel(&self) -> bool {
        let mut status = self.inner.status.lock();
        if *status == HandleStatus::Queued {
            *status = HandleStatus::Cancelled;
            true
        } else {
            false
        }
    }

    /// Awaits the single terminal outcome. Panics if called more than once
    /// on clones of the same handle — the channel can only be taken once.
    pub async fn result(&self) -> Result<Receipt, ClientError> {
        let rx = self
            .inner
            .result_rx
            .lock()
            .take()
            .expect("AsyncHandle::result() called more than once");
        rx.await.unwrap_or(Err(ClientError::Closed))
    }

    pub(crate) fn mark_processing(&self) {
        let mut status = self.inner.status.lock();
        if status.is_terminal() {
            return;
        }
        *status = HandleStatus::Processing;
        drop(status);
        for cb in &self.inner.callbacks.lock().on_progress {
            cb(HandleStatus::Processing);
        }
    }

    /// Drives the single terminal transition: sets status, fires
    /// success/failure then complete callbacks in registration order, and
    /// resolves the result channel. A no-op if already terminal (covers a
    /// handle that was cancelled before this fired).
    pub(crate) fn complete(&self, outcome: Result<Receipt, ClientError>) {
        {
            let mut status = self.inner.status.lock();
            if status.is_terminal() {
                return;
            }
            *status = if outcome.is_ok() { HandleStatus::Completed } else { HandleStatus::Failed };
        }

        let mut callbacks = self.inner.callbacks.lock();
        match &outcome {
            Ok(receipt) => {
                for cb in callbacks.on_success.drain(..) {
                    cb(receipt);
                }
            }
            Err(e) => {
                for cb in callbacks.on_failure.drain(..) {
                    cb(e);
                }
            }
        }
        for cb in callbacks.on_complete.drain(..) {
            cb();
        }
        drop(callbacks);

        if let Some(tx) = self.inner.result_tx.lock().take() {
            let _ = tx.send(outcome);
        }
    }
}
