//! In-process queue backend: three lanes (main, priority, delayed) guarded by
//! a single lock, with a background task promoting delayed messages once
//! they come due.
//!
//! The spec's literal suggestion is a lock-free channel for the main lane
//! plus a mutex for the two heaps; that shape can't support `peek()` without
//! consuming an item, so all three lanes live under one `parking_lot::Mutex`
//! instead. Contention is low: a single compare/push/pop per call.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use notifyhub_common::{Priority, QueueMessage};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{QueueError, Result};
use crate::stats::{EventBus, QueueCounters, QueueEvent, QueueStats};
use crate::{ObservableQueue, Queue};

const DEFAULT_MOVER_TICK: Duration = Duration::from_millis(100);

/// Wraps a `QueueMessage` in the delayed lane, ordered by `scheduled_at`
/// ascending (soonest-due first) when used in a `BinaryHeap`.
struct DelayedEntry(QueueMessage);

impl PartialEq for DelayedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.scheduled_at == other.0.scheduled_at
    }
}
impl Eq for DelayedEntry {}

impl PartialOrd for DelayedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reversed: BinaryHeap is a max-heap, we want soonest `scheduled_at` on top.
        other.0.scheduled_at.cmp(&self.0.scheduled_at)
    }
}

#[derive(Default)]
struct Lanes {
    main: VecDeque<QueueMessage>,
    priority: BinaryHeap<QueueMessage>,
    delayed: BinaryHeap<DelayedEntry>,
}

impl Lanes {
    fn len(&self) -> usize {
        self.main.len() + self.priority.len() + self.delayed.len()
    }

    /// Pop the next ready message, priority lane first, then main lane FIFO.
    /// Never pulls from the delayed lane directly; the mover task promotes it.
    fn pop_ready(&mut self) -> Option<QueueMessage> {
        if let Some(message) = self.priority.pop() {
            return Some(message);
        }
        self.main.pop_front()
    }

    fn peek_ready(&self) -> Option<&QueueMessage> {
        self.priority.peek().or_else(|| self.main.front())
    }
}

/// In-memory, process-local queue. Cheap to construct, lost on restart.
pub struct MemoryQueue {
    lanes: Arc<Mutex<Lanes>>,
    capacity: usize,
    notify: Arc<Notify>,
    closed: Arc<AtomicBool>,
    counters: Arc<QueueCounters>,
    events: Arc<EventBus>,
    mover: Option<JoinHandle<()>>,
}

impl MemoryQueue {
    /// `capacity` of 0 means unbounded.
    pub fn new(capacity: usize) -> Self {
        Self::with_mover_tick(capacity, DEFAULT_MOVER_TICK)
    }

    pub fn with_mover_tick(capacity: usize, mover_tick: Duration) -> Self {
        let lanes = Arc::new(Mutex::new(Lanes::default()));
        let notify = Arc::new(Notify::new());
        let closed = Arc::new(AtomicBool::new(false));

        let mover = tokio::spawn(run_mover(
            lanes.clone(),
            notify.clone(),
            closed.clone(),
            mover_tick,
        ));

        Self {
            lanes,
            capacity,
            notify,
            closed,
            counters: Arc::new(QueueCounters::default()),
            events: Arc::new(EventBus::new()),
            mover: Some(mover),
        }
    }
}

impl Drop for MemoryQueue {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        if let Some(handle) = self.mover.take() {
            handle.abort();
        }
    }
}

/// Promotes due delayed messages into the priority or main lane every tick.
async fn run_mover(
    lanes: Arc<Mutex<Lanes>>,
    notify: Arc<Notify>,
    closed: Arc<AtomicBool>,
    tick: Duration,
) {
    let mut interval = tokio::time::interval(tick);
    loop {
        interval.tick().await;
        if closed.load(Ordering::SeqCst) {
            return;
        }
        let now = Utc::now();
        let mut promoted = false;
        {
            let mut guard = lanes.lock();
            while let Some(top) = guard.delayed.peek() {
                if top.0.scheduled_at > now {
                    break;
                }
                let DelayedEntry(message) = guard.delayed.pop().unwrap();
                if message.priority().is_elevated() {
                    guard.priority.push(message);
                } else {
                    guard.main.push_back(message);
                }
                promoted = true;
            }
        }
        if promoted {
            notify.notify_waiters();
        }
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn enqueue(&self, message: QueueMessage) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }

        let now = Utc::now();
        let delayed = message.is_delayed(now);

        {
            let mut guard = self.lanes.lock();
            if self.capacity > 0 && guard.len() >= self.capacity {
                return Err(QueueError::Full);
            }
            if delayed {
                guard.delayed.push(DelayedEntry(message.clone()));
            } else if message.priority().is_elevated() {
                guard.priority.push(message.clone());
            } else {
                guard.main.push_back(message.clone());
            }
        }

        self.counters.record(QueueEvent::Enqueue);
        self.events.publish(QueueEvent::Enqueue, &message);
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<QueueMessage> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(message) = self.lanes.lock().pop_ready() {
                self.counters.record(QueueEvent::Dequeue);
                self.events.publish(QueueEvent::Dequeue, &message);
                return Ok(message);
            }

            if self.closed.load(Ordering::SeqCst) {
                return Err(QueueError::Closed);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(QueueError::Empty);
            }

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(remaining) => {}
            }
        }
    }

    async fn peek(&self) -> Result<Option<QueueMessage>> {
        Ok(self.lanes.lock().peek_ready().cloned())
    }

    async fn len(&self) -> usize {
        self.lanes.lock().len()
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl ObservableQueue for MemoryQueue {
    async fn stats(&self) -> QueueStats {
        let guard = self.lanes.lock();
        QueueStats {
            main_lane_size: guard.main.len() as u64,
            priority_lane_size: guard.priority.len() as u64,
            delayed_lane_size: guard.delayed.len() as u64,
            total_enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            total_dequeued: self.counters.dequeued.load(Ordering::Relaxed),
            total_retried: self.counters.retried.load(Ordering::Relaxed),
            total_dead_lettered: self.counters.dead_lettered.load(Ordering::Relaxed),
        }
    }

    fn subscribe(&self, event: QueueEvent, callback: impl Fn(&QueueMessage) + Send + Sync + 'static) -> u64 {
        self.events.subscribe(event, callback)
    }

    fn unsubscribe(&self, event: QueueEvent, token: u64) {
        self.events.unsubscribe(event, token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notifyhub_common::{Message, MessageBuilder, Target, TargetType};

    fn message(priority: Priority) -> QueueMessage {
        let msg: Message = MessageBuilder::new()
            .title("hi")
            .priority(priority)
            .target(Target::new(TargetType::Email, "a@example.com").unwrap())
            .build()
            .unwrap();
        QueueMessage::new(msg, 3)
    }

    #[tokio::test]
    async fn priority_lane_drains_before_main_lane() {
        let queue = MemoryQueue::new(0);
        queue.enqueue(message(Priority::Normal)).await.unwrap();
        queue.enqueue(message(Priority::Urgent)).await.unwrap();

        let first = queue.dequeue(Duration::from_millis(50)).await.unwrap();
        assert_eq!(first.priority(), Priority::Urgent);
        let second = queue.dequeue(Duration::from_millis(50)).await.unwrap();
        assert_eq!(second.priority(), Priority::Normal);
    }

    #[tokio::test]
    async fn dequeue_times_out_on_empty_queue() {
        let queue = MemoryQueue::new(0);
        let result = queue.dequeue(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(QueueError::Empty)));
    }

    #[tokio::test]
    async fn enqueue_rejects_when_at_capacity() {
        let queue = MemoryQueue::new(1);
        queue.enqueue(message(Priority::Normal)).await.unwrap();
        let result = queue.enqueue(message(Priority::Normal)).await;
        assert!(matches!(result, Err(QueueError::Full)));
    }

    #[tokio::test]
    async fn delayed_message_is_promoted_once_due() {
        let queue = MemoryQueue::with_mover_tick(0, Duration::from_millis(10));
        let mut msg = message(Priority::Normal);
        msg.scheduled_at = Utc::now() + chrono::Duration::milliseconds(30);
        queue.enqueue(msg).await.unwrap();

        assert_eq!(queue.len().await, 1);
        let result = queue.dequeue(Duration::from_millis(200)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn close_wakes_blocked_dequeuers() {
        let queue = Arc::new(MemoryQueue::new(0));
        let waiter = tokio::spawn({
            let queue = queue.clone();
            async move { queue.dequeue(Duration::from_secs(5)).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close().await.unwrap();
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(QueueError::Closed)));
    }
}
