//! Redis-backed queue: lists for the main/priority lanes, a sorted set for
//! the delayed lane keyed by `scheduled_at` (unix millis) as score. One
//! `Queue` impl covers both producer and consumer sides, since NotifyHub
//! has no separate producer/consumer process boundary.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use notifyhub_common::QueueMessage;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::time::Instant;

use crate::error::{QueueError, Result};
use crate::stats::{EventBus, QueueCounters, QueueEvent, QueueStats};
use crate::{ObservableQueue, Queue};

/// Redis key namespace for a single logical queue. Keys are derived by
/// suffixing `prefix` so one Redis instance can host several named queues.
#[derive(Clone)]
struct Keys {
    main: String,
    priority: String,
    delayed: String,
}

impl Keys {
    fn new(prefix: &str) -> Self {
        Self {
            main: format!("{prefix}:main"),
            priority: format!("{prefix}:priority"),
            delayed: format!("{prefix}:delayed"),
        }
    }
}

pub struct RedisQueue {
    manager: ConnectionManager,
    keys: Keys,
    capacity: usize,
    counters: QueueCounters,
    events: EventBus,
}

impl RedisQueue {
    pub async fn connect(redis_url: &str, queue_prefix: &str, capacity: usize) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(QueueError::from)?;
        let manager = client.get_connection_manager().await.map_err(QueueError::from)?;
        Ok(Self {
            manager,
            keys: Keys::new(queue_prefix),
            capacity,
            counters: QueueCounters::default(),
            events: EventBus::new(),
        })
    }

    async fn promote_due_delayed(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        let now_millis = Utc::now().timestamp_millis();
        let due: Vec<String> = conn
            .zrangebyscore(&self.keys.delayed, 0, now_millis)
            .await
            .map_err(QueueError::from)?;

        for raw in due {
            let removed: i64 = conn.zrem(&self.keys.delayed, &raw).await.map_err(QueueError::from)?;
            if removed == 0 {
                continue; // another worker already promoted it
            }
            let message: QueueMessage =
                serde_json::from_str(&raw).map_err(|e| QueueError::InvalidMessage(e.to_string()))?;
            let lane = if message.priority().is_elevated() {
                &self.keys.priority
            } else {
                &self.keys.main
            };
            let _: () = conn.lpush(lane, raw).await.map_err(QueueError::from)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Queue for RedisQueue {
    async fn enqueue(&self, message: QueueMessage) -> Result<()> {
        if self.capacity > 0 && self.len().await >= self.capacity {
            return Err(QueueError::Full);
        }

        let payload = serde_json::to_string(&message).map_err(|e| QueueError::InvalidMessage(e.to_string()))?;
        let mut conn = self.manager.clone();
        let now = Utc::now();

        if message.is_delayed(now) {
            let score = message.scheduled_at.unwrap().timestamp_millis();
            let _: () = conn
                .zadd(&self.keys.delayed, payload, score)
                .await
                .map_err(QueueError::from)?;
        } else if message.priority().is_elevated() {
            let _: () = conn.lpush(&self.keys.priority, payload).await.map_err(QueueError::from)?;
        } else {
            let _: () = conn.lpush(&self.keys.main, payload).await.map_err(QueueError::from)?;
        }

        self.counters.record(QueueEvent::Enqueue);
        self.events.publish(QueueEvent::Enqueue, &message);
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<QueueMessage> {
        let deadline = Instant::now() + timeout;
        loop {
            self.promote_due_delayed().await?;

            let mut conn = self.manager.clone();
            let raw: Option<String> = conn.rpop(&self.keys.priority, None).await.map_err(QueueError::from)?;
            let raw = match raw {
                Some(raw) => Some(raw),
                None => conn.rpop(&self.keys.main, None).await.map_err(QueueError::from)?,
            };

            if let Some(raw) = raw {
                let message: QueueMessage =
                    serde_json::from_str(&raw).map_err(|e| QueueError::InvalidMessage(e.to_string()))?;
                self.counters.record(QueueEvent::Dequeue);
                self.events.publish(QueueEvent::Dequeue, &message);
                return Ok(message);
            }

            if Instant::now() >= deadline {
                return Err(QueueError::Empty);
            }
            tokio::time::sleep(Duration::from_millis(100).min(deadline.saturating_duration_since(Instant::now())))
                .await;
        }
    }

    async fn peek(&self) -> Result<Option<QueueMessage>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.lindex(&self.keys.priority, -1).await.map_err(QueueError::from)?;
        let raw = match raw {
            Some(raw) => Some(raw),
            None => conn.lindex(&self.keys.main, -1).await.map_err(QueueError::from)?,
        };
        raw.map(|raw| serde_json::from_str(&raw).map_err(|e| QueueError::InvalidMessage(e.to_string())))
            .transpose()
    }

    async fn len(&self) -> usize {
        let mut conn = self.manager.clone();
        let main: usize = conn.llen(&self.keys.main).await.unwrap_or(0);
        let priority: usize = conn.llen(&self.keys.priority).await.unwrap_or(0);
        let delayed: usize = conn.zcard(&self.keys.delayed).await.unwrap_or(0);
        main + priority + delayed
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ObservableQueue for RedisQueue {
    async fn stats(&self) -> QueueStats {
        let mut conn = self.manager.clone();
        let main: u64 = conn.llen(&self.keys.main).await.unwrap_or(0);
        let priority: u64 = conn.llen(&self.keys.priority).await.unwrap_or(0);
        let delayed: u64 = conn.zcard(&self.keys.delayed).await.unwrap_or(0);
        QueueStats {
            main_lane_size: main,
            priority_lane_size: priority,
            delayed_lane_size: delayed,
            total_enqueued: self.counters.enqueued.load(std::sync::atomic::Ordering::Relaxed),
            total_dequeued: self.counters.dequeued.load(std::sync::atomic::Ordering::Relaxed),
            total_retried: self.counters.retried.load(std::sync::atomic::Ordering::Relaxed),
            total_dead_lettered: self.counters.dead_lettered.load(std::sync::atomic::Ordering::Relaxed),
        }
    }

    fn subscribe(&self, event: QueueEvent, callback: impl Fn(&QueueMessage) + Send + Sync + 'static) -> u64 {
        self.events.subscribe(event, callback)
    }

    fn unsubscribe(&self, event: QueueEvent, token: u64) {
        self.events.unsubscribe(event, token);
    }
}
