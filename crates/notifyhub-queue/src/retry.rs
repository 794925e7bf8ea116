//! Retry-aware wrapper around any [`Queue`]: tracks per-message attempt
//! counts, applies exponential backoff with jitter on requeue, and hands
//! exhausted messages off to a dead-letter queue instead of dropping them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use notifyhub_common::QueueMessage;
use rand::Rng;

use crate::error::Result;
use crate::stats::{QueueEvent, QueueStats};
use crate::{ObservableQueue, Queue};

/// Retry timing policy. Immutable once attached to a `RetryQueue`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    pub max_elapsed: Duration,
    /// Jitter as a fraction of the computed delay, applied as +/-.
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial: Duration::from_secs(1),
            multiplier: 2.0,
            max_interval: Duration::from_secs(30),
            max_elapsed: Duration::from_secs(5 * 60),
            jitter_fraction: 0.1,
        }
    }
}

impl RetryPolicy {
    /// `initial * multiplier^(retry_count - 1)`, capped at `max_interval`,
    /// jittered by `+/- jitter_fraction`.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(32);
        let raw_millis = self.initial.as_millis() as f64 * self.multiplier.powi(exponent as i32);
        let capped_millis = raw_millis.min(self.max_interval.as_millis() as f64);

        let jitter_range = capped_millis * self.jitter_fraction;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        let millis = (capped_millis + jitter).max(0.0) as u64;
        Duration::from_millis(millis)
    }
}

/// Dead-letter bookkeeping metadata keys, written onto a message's
/// `metadata` map before it is moved to the DLQ.
pub const DLQ_REASON_KEY: &str = "dlq_reason";
pub const DLQ_TIMESTAMP_KEY: &str = "dlq_timestamp";
pub const DLQ_ORIGINAL_RETRY_COUNT_KEY: &str = "original_retry_count";
const DLQ_REASON_MAX_RETRIES: &str = "max_retries_exceeded";
const DLQ_REASON_MAX_ELAPSED: &str = "max_elapsed_exceeded";

/// What happened to a message handed to [`RetryQueue::retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    Requeued,
    DeadLettered,
}

/// Wraps a `Queue`, intercepting `retry`-style nacks so callers don't have
/// to reimplement backoff or dead-letter bookkeeping themselves. The DLQ is
/// a full, independently-capacitied queue instance — inspectable, never
/// auto-drained.
pub struct RetryQueue<Q: Queue> {
    inner: Q,
    policy: RetryPolicy,
    dead_letter: Arc<dyn Queue>,
}

impl<Q: Queue> RetryQueue<Q> {
    pub fn new(inner: Q, dead_letter: Arc<dyn Queue>) -> Self {
        Self {
            inner,
            policy: RetryPolicy::default(),
            dead_letter,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn inner(&self) -> &Q {
        &self.inner
    }

    pub fn dead_letter_queue(&self) -> &Arc<dyn Queue> {
        &self.dead_letter
    }

    /// Record a failed delivery attempt: increments `retry_count`, and
    /// either reschedules with backoff or moves the message to the DLQ.
    pub async fn retry(&self, mut message: QueueMessage) -> Result<RetryOutcome> {
        if message.max_retries == 0 {
            message.max_retries = self.policy.max_retries;
        }
        message.retry_count += 1;

        let elapsed = Utc::now().signed_duration_since(message.timestamp);
        let elapsed = elapsed.to_std().unwrap_or_default();

        if message.retry_count > message.max_retries {
            self.move_to_dead_letter(message, DLQ_REASON_MAX_RETRIES).await?;
            return Ok(RetryOutcome::DeadLettered);
        }
        if elapsed >= self.policy.max_elapsed {
            self.move_to_dead_letter(message, DLQ_REASON_MAX_ELAPSED).await?;
            return Ok(RetryOutcome::DeadLettered);
        }

        let delay = self.policy.delay_for(message.retry_count);
        message.scheduled_at = Some(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default());
        self.inner.enqueue(message).await?;
        Ok(RetryOutcome::Requeued)
    }

    async fn move_to_dead_letter(&self, mut message: QueueMessage, reason: &str) -> Result<()> {
        message
            .metadata
            .insert(DLQ_REASON_KEY.to_string(), reason.to_string());
        message
            .metadata
            .insert(DLQ_TIMESTAMP_KEY.to_string(), Utc::now().to_rfc3339());
        message.metadata.insert(
            DLQ_ORIGINAL_RETRY_COUNT_KEY.to_string(),
            message.retry_count.to_string(),
        );
        tracing::warn!(
            message_id = %message.message.id,
            retry_count = message.retry_count,
            reason,
            "message moved to dead-letter queue"
        );
        self.dead_letter.enqueue(message).await
    }
}

#[async_trait]
impl<Q: Queue> Queue for RetryQueue<Q> {
    async fn enqueue(&self, message: QueueMessage) -> Result<()> {
        self.inner.enqueue(message).await
    }

    async fn dequeue(&self, timeout: Duration) -> Result<QueueMessage> {
        self.inner.dequeue(timeout).await
    }

    async fn peek(&self) -> Result<Option<QueueMessage>> {
        self.inner.peek().await
    }

    async fn len(&self) -> usize {
        self.inner.len().await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}

impl<Q: Queue + ObservableQueue> RetryQueue<Q> {
    pub async fn stats(&self) -> QueueStats {
        self.inner.stats().await
    }
}

pub use QueueEvent as RetryEvent;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryQueue;
    use notifyhub_common::{Message, MessageBuilder, Priority, Target, TargetType};

    fn message() -> QueueMessage {
        let msg: Message = MessageBuilder::new()
            .title("hi")
            .priority(Priority::Normal)
            .target(Target::new(TargetType::Email, "a@example.com").unwrap())
            .build()
            .unwrap();
        QueueMessage::new(msg, 2)
    }

    #[test]
    fn delay_grows_by_multiplier_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial: Duration::from_millis(100),
            multiplier: 2.0,
            max_interval: Duration::from_secs(1),
            max_elapsed: Duration::from_secs(60),
            jitter_fraction: 0.0,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(10), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn retry_requeues_until_retries_exhausted_then_dead_letters() {
        let dlq: Arc<dyn Queue> = Arc::new(MemoryQueue::new(0));
        let retry_queue = RetryQueue::new(MemoryQueue::new(0), dlq.clone()).with_policy(RetryPolicy {
            max_retries: 2,
            initial: Duration::from_millis(1),
            multiplier: 2.0,
            max_interval: Duration::from_millis(5),
            max_elapsed: Duration::from_secs(60),
            jitter_fraction: 0.0,
        });

        let msg = message();
        retry_queue.retry(msg.clone()).await.unwrap();
        assert_eq!(dlq.len().await, 0);

        let requeued = retry_queue.dequeue(Duration::from_millis(100)).await.unwrap();
        assert_eq!(requeued.retry_count, 1);

        retry_queue.retry(requeued).await.unwrap();
        let requeued = retry_queue.dequeue(Duration::from_millis(100)).await.unwrap();
        assert_eq!(requeued.retry_count, 2);

        retry_queue.retry(requeued).await.unwrap();
        assert_eq!(dlq.len().await, 1);

        let dead = dlq.dequeue(Duration::from_millis(100)).await.unwrap();
        assert_eq!(
            dead.metadata.get(DLQ_REASON_KEY).map(String::as_str),
            Some("max_retries_exceeded")
        );
    }

    #[tokio::test]
    async fn retry_honors_zero_max_retries_as_policy_default() {
        let dlq: Arc<dyn Queue> = Arc::new(MemoryQueue::new(0));
        let retry_queue = RetryQueue::new(MemoryQueue::new(0), dlq).with_policy(RetryPolicy {
            max_retries: 3,
            initial: Duration::from_millis(1),
            multiplier: 2.0,
            max_interval: Duration::from_millis(5),
            max_elapsed: Duration::from_secs(60),
            jitter_fraction: 0.0,
        });

        let mut msg = message();
        msg.max_retries = 0;
        retry_queue.retry(msg).await.unwrap();

        let requeued = retry_queue.dequeue(Duration::from_millis(100)).await.unwrap();
        assert_eq!(requeued.max_retries, 3);
    }
}
