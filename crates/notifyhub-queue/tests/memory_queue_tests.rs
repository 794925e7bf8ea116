//! End-to-end exercise of `MemoryQueue` and `RetryQueue` through the public
//! `Queue` trait, the way a caller outside this crate would use them.

use std::sync::Arc;
use std::time::Duration;

use notifyhub_common::{Message, MessageBuilder, Priority, QueueMessage, Target, TargetType};
use notifyhub_queue::memory::MemoryQueue;
use notifyhub_queue::{Queue, QueueError, RetryPolicy, RetryQueue};

fn message_with(priority: Priority) -> QueueMessage {
    let msg: Message = MessageBuilder::new()
        .title("hello")
        .body("world")
        .priority(priority)
        .target(Target::new(TargetType::Email, "a@example.com").unwrap())
        .build()
        .unwrap();
    QueueMessage::new(msg, 3)
}

#[tokio::test]
async fn fifo_within_the_main_lane() {
    let queue = MemoryQueue::new(0);
    for i in 0..5 {
        let mut m = message_with(Priority::Normal);
        m.message.title = format!("msg-{i}");
        queue.enqueue(m).await.unwrap();
    }

    for i in 0..5 {
        let out = queue.dequeue(Duration::from_millis(50)).await.unwrap();
        assert_eq!(out.message.title, format!("msg-{i}"));
    }
}

#[tokio::test]
async fn closed_queue_rejects_further_enqueues() {
    let queue = MemoryQueue::new(0);
    queue.close().await.unwrap();
    let result = queue.enqueue(message_with(Priority::Normal)).await;
    assert!(matches!(result, Err(QueueError::Closed)));
}

#[tokio::test]
async fn retry_queue_drains_concurrently_with_enqueue() {
    let dlq: Arc<dyn Queue> = Arc::new(MemoryQueue::new(0));
    let main: Arc<dyn Queue> = Arc::new(MemoryQueue::new(0));
    let retry_queue = Arc::new(
        RetryQueue::new(main, dlq.clone()).with_policy(RetryPolicy {
            max_retries: 1,
            initial: Duration::from_millis(1),
            multiplier: 1.0,
            max_interval: Duration::from_millis(5),
            max_elapsed: Duration::from_secs(60),
            jitter_fraction: 0.0,
        }),
    );

    let producer = {
        let retry_queue = retry_queue.clone();
        tokio::spawn(async move {
            for _ in 0..10 {
                retry_queue.enqueue(message_with(Priority::Normal)).await.unwrap();
            }
        })
    };
    producer.await.unwrap();

    assert_eq!(retry_queue.len().await, 10);
    for _ in 0..10 {
        retry_queue.dequeue(Duration::from_millis(100)).await.unwrap();
    }
    assert_eq!(retry_queue.len().await, 0);
}

#[tokio::test]
async fn arc_dyn_queue_can_itself_be_wrapped_in_a_retry_queue() {
    let backend: Arc<dyn Queue> = Arc::new(MemoryQueue::new(0));
    let dlq: Arc<dyn Queue> = Arc::new(MemoryQueue::new(0));
    let retry_queue = RetryQueue::new(backend, dlq);

    retry_queue.enqueue(message_with(Priority::Urgent)).await.unwrap();
    let out = retry_queue.dequeue(Duration::from_millis(50)).await.unwrap();
    assert_eq!(out.priority(), Priority::Urgent);
}
