//! Priority + delayed + retry-capable message queue.
//!
//! The core contract is [`Queue`]: enqueue/dequeue/peek/len/close, backed by
//! either an in-process [`memory::MemoryQueue`] or (with the `redis-backend`
//! feature) a Redis-backed implementation. [`retry::RetryQueue`] wraps any
//! `Queue` to add retry-count bookkeeping, exponential backoff, and
//! dead-letter handoff.

pub mod error;
pub mod memory;
#[cfg(feature = "redis-backend")]
pub mod redis_backend;
pub mod retry;
pub mod stats;

pub use error::{QueueError, Result};
pub use retry::{RetryOutcome, RetryPolicy, RetryQueue};
pub use stats::{EventBus, QueueCounters, QueueEvent, QueueStats};

use async_trait::async_trait;
use notifyhub_common::QueueMessage;
use std::time::Duration;

/// A single logical queue lane: main, priority, and delayed, with FIFO/timestamp
/// tie-breaks as specified on [`notifyhub_common::QueueMessage`]'s `Ord` impl.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Enqueue a message. Returns `QueueError::Full` if the queue is at capacity.
    async fn enqueue(&self, message: QueueMessage) -> Result<()>;

    /// Dequeue the next ready message, waiting up to `timeout` for one to
    /// become available. Returns `QueueError::Empty` on timeout.
    async fn dequeue(&self, timeout: Duration) -> Result<QueueMessage>;

    /// Look at the next ready message without removing it, if any.
    async fn peek(&self) -> Result<Option<QueueMessage>>;

    /// Total number of messages currently held (all lanes, ready or delayed).
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Enqueue several messages. Not atomic: a failure partway through
    /// leaves earlier messages enqueued. Backends may override for a
    /// pipelined implementation.
    async fn enqueue_batch(&self, messages: Vec<QueueMessage>) -> Result<()> {
        for message in messages {
            self.enqueue(message).await?;
        }
        Ok(())
    }

    /// Dequeue up to `n` ready messages, waiting up to `timeout` total for
    /// the first one. Returns fewer than `n` if the queue runs dry.
    async fn dequeue_batch(&self, n: usize, timeout: Duration) -> Result<Vec<QueueMessage>> {
        let mut out = Vec::with_capacity(n);
        if n == 0 {
            return Ok(out);
        }
        match self.dequeue(timeout).await {
            Ok(message) => out.push(message),
            Err(QueueError::Empty) => return Ok(out),
            Err(e) => return Err(e),
        }
        while out.len() < n {
            match self.dequeue(Duration::ZERO).await {
                Ok(message) => out.push(message),
                Err(_) => break,
            }
        }
        Ok(out)
    }

    /// Remove all messages from all lanes. Not required to be atomic with
    /// concurrent enqueues.
    async fn clear(&self) -> Result<()> {
        while self.dequeue(Duration::ZERO).await.is_ok() {}
        Ok(())
    }

    /// Stop accepting new work and wake any blocked dequeuers. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// Extension trait for queues that expose stats and lifecycle events.
/// Implemented by every backend in this crate; kept separate from [`Queue`]
/// so external backends aren't forced to support it.
#[async_trait]
pub trait ObservableQueue: Queue {
    async fn stats(&self) -> QueueStats;

    /// Subscribe a callback to a lifecycle event; returns a token for
    /// `unsubscribe`.
    fn subscribe(&self, event: QueueEvent, callback: impl Fn(&QueueMessage) + Send + Sync + 'static) -> u64
    where
        Self: Sized;

    fn unsubscribe(&self, event: QueueEvent, token: u64);
}

/// Lets a type-erased queue (`Arc<dyn Queue>`) itself be wrapped in a
/// [`RetryQueue`] or passed wherever a bound `Q: Queue` is expected, so
/// callers that need to pick a backend at runtime aren't forced to carry a
/// backend type parameter through to `notifyhub-client`'s `Client`.
#[async_trait]
impl Queue for std::sync::Arc<dyn Queue> {
    async fn enqueue(&self, message: QueueMessage) -> Result<()> {
        (**self).enqueue(message).await
    }

    async fn dequeue(&self, timeout: Duration) -> Result<QueueMessage> {
        (**self).dequeue(timeout).await
    }

    async fn peek(&self) -> Result<Option<QueueMessage>> {
        (**self).peek().await
    }

    async fn len(&self) -> usize {
        (**self).len().await
    }

    async fn close(&self) -> Result<()> {
        (**self).close().await
    }
}
