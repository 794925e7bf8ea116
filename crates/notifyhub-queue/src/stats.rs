//! Observable-queue extension: counters, gauges, and a typed event bus.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use notifyhub_common::QueueMessage;
use serde::Serialize;

/// Events a queue can publish to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueEvent {
    Enqueue,
    Dequeue,
    Retry,
    DeadLetter,
}

/// A point-in-time snapshot of queue counters and lane sizes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub main_lane_size: u64,
    pub priority_lane_size: u64,
    pub delayed_lane_size: u64,
    pub total_enqueued: u64,
    pub total_dequeued: u64,
    pub total_retried: u64,
    pub total_dead_lettered: u64,
}

impl QueueStats {
    pub fn total_size(&self) -> u64 {
        self.main_lane_size + self.priority_lane_size + self.delayed_lane_size
    }
}

/// Atomic counters shared between a queue and its stats snapshot.
#[derive(Debug, Default)]
pub struct QueueCounters {
    pub enqueued: AtomicU64,
    pub dequeued: AtomicU64,
    pub retried: AtomicU64,
    pub dead_lettered: AtomicU64,
}

impl QueueCounters {
    pub fn record(&self, event: QueueEvent) {
        let counter = match event {
            QueueEvent::Enqueue => &self.enqueued,
            QueueEvent::Dequeue => &self.dequeued,
            QueueEvent::Retry => &self.retried,
            QueueEvent::DeadLetter => &self.dead_lettered,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

type Subscriber = Arc<dyn Fn(&QueueMessage) + Send + Sync>;

/// Best-effort pub/sub for queue lifecycle events. A panicking subscriber is
/// caught and does not affect other subscribers or the caller.
#[derive(Default)]
pub struct EventBus {
    subscribers: DashMap<QueueEvent, Vec<(u64, Subscriber)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        event: QueueEvent,
        callback: impl Fn(&QueueMessage) + Send + Sync + 'static,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .entry(event)
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    pub fn unsubscribe(&self, event: QueueEvent, id: u64) {
        if let Some(mut subs) = self.subscribers.get_mut(&event) {
            subs.retain(|(sub_id, _)| *sub_id != id);
        }
    }

    pub fn publish(&self, event: QueueEvent, message: &QueueMessage) {
        let Some(subs) = self.subscribers.get(&event) else {
            return;
        };
        for (_, callback) in subs.iter() {
            let callback = callback.clone();
            let message = message.clone();
            // Isolate panics per-subscriber; a bad callback must not break dispatch.
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(&message)));
            if result.is_err() {
                tracing::warn!(?event, "queue event subscriber panicked");
            }
        }
    }
}
