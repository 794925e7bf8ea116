//! `AsyncBatchHandle`: aggregates N [`AsyncHandle`]s under one batch id,
//! exposing per-item status alongside a single completion channel and
//! batch-wide callbacks fired once every item has reached a terminal state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use notifyhub_common::Receipt;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::ClientError;
use crate::handle::{AsyncHandle, HandleStatus};

/// Per-item outcome as seen from the batch: `None` while still in flight.
pub type BatchItemResult = Option<Result<Receipt, ClientError>>;

type BatchCallback = Box<dyn FnOnce(&[BatchItemResult]) + Send>;

struct Inner {
    batch_id: String,
    handles: Vec<AsyncHandle>,
    remaining: AtomicUsize,
    results: Mutex<Vec<BatchItemResult>>,
    callbacks: Mutex<Vec<BatchCallback>>,
    complete_tx: Mutex<Option<oneshot::Sender<Vec<BatchItemResult>>>>,
    complete_rx: Mutex<Option<oneshot::Receiver<Vec<BatchItemResult>>>>,
}

#[derive(Clone)]
pub struct AsyncBatchHandle {
    inner: Arc<Inner>,
}

impl AsyncBatchHandle {
    pub(crate) fn new(batch_id: impl Into<String>, handles: Vec<AsyncHandle>) -> Self {
        let count = handles.len();
        let (tx, rx) = oneshot::channel();
        Self {
            inner: Arc::new(Inner {
                batch_id: batch_id.into(),
                handles,
                remaining: AtomicUsize::new(count),
                results: Mutex::new(vec![None; count]),
                callbacks: Mutex::new(Vec::new()),
                complete_tx: Mutex::new(Some(tx)),
                complete_rx: Mutex::new(Some(rx)),
            }),
        }
    }

    pub fn batch_id(&self) -> &str {
        &self.inner.batch_id
    }

    pub fn len(&self) -> usize {
        self.inner.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.handles.is_empty()
    }

    pub fn handle(&self, index: usize) -> Option<&AsyncHandle> {
        self.inner.handles.get(index)
    }

    pub fn statuses(&self) -> Vec<HandleStatus> {
        self.inner.handles.iter().map(|h| h.status()).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.inner.remaining.load(Ordering::SeqCst) == 0
    }

    /// Cancels every member handle still queued; returns how many were
    /// actually cancelled.
    pub fn cancel_all(&self) -> usize {
        self.inner.handles.iter().filter(|h| h.cancel()).count()
    }

    /// Registers a callback invoked once, after every member handle has
    /// reached a terminal state, with the final per-item results in
    /// original submission order. Fires immediately (synchronously) if the
    /// batch is already complete.
    pub fn on_complete(&self, cb: impl FnOnce(&[BatchItemResult]) + Send + 'static) {
        if self.inner.remaining.load(Ordering::SeqCst) == 0 {
            cb(&self.inner.results.lock());
            return;
        }
        self.inner.callbacks.lock().push(Box::new(cb));
    }

    /// Awaits the aggregate completion signal, returning per-item results
    /// in original submission order.
    pub async fn results(&self) -> Vec<BatchItemResult> {
        let rx = self.inner.complete_rx.lock().take();
        match rx {
            Some(rx) => rx.await.unwrap_or_default(),
            None => self.inner.results.lock().clone(),
        }
    }

    /// Invoked by the item at `index` when it reaches a terminal state.
    /// Once every item has reported in, resolves the aggregate channel and
    /// fires batch-wide callbacks.
    pub(crate) fn record_item(&self, index: usize, result: Result<Receipt, ClientError>) {
        {
            let mut results = self.inner.results.lock();
            if results[index].is_some() {
                return;
            }
            results[index] = Some(result);
        }

        if self.inner.remaining.fetch_sub(1, Ordering::SeqCst) != 1 {
            return;
        }

        let final_results = self.inner.results.lock().clone();
        for cb in self.inner.callbacks.lock().drain(..) {
            cb(&final_results);
        }
        if let Some(tx) = self.inner.complete_tx.lock().take() {
            let _ = tx.send(final_results);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[tokio::test]
    async fn completes_only_after_every_item_reports() {
        let handles = vec![AsyncHandle::new("a"), AsyncHandle::new("b")];
        let batch = AsyncBatchHandle::new("batch-1", handles);

        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        batch.on_complete(move |_| fired2.store(true, Ordering::SeqCst));

        batch.record_item(0, Ok(Receipt::new("a", vec![])));
        assert!(!fired.load(Ordering::SeqCst));

        batch.record_item(1, Ok(Receipt::new("b", vec![])));
        assert!(fired.load(Ordering::SeqCst));

        let results = batch.results().await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.as_ref().unwrap().is_ok()));
    }

    #[test]
    fn duplicate_report_for_same_index_is_ignored() {
        let handles = vec![AsyncHandle::new("a")];
        let batch = AsyncBatchHandle::new("batch-1", handles);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        batch.on_complete(move |_| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });

        batch.record_item(0, Ok(Receipt::new("a", vec![])));
        batch.record_item(0, Ok(Receipt::new("a", vec![])));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn on_complete_fires_immediately_if_already_done() {
        let handles = vec![AsyncHandle::new("a")];
        let batch = AsyncBatchHandle::new("batch-1", handles);
        batch.record_item(0, Ok(Receipt::new("a", vec![])));

        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        batch.on_complete(move |_| fired2.store(true, Ordering::SeqCst));
        assert!(fired.load(Ordering::SeqCst));
    }
}
