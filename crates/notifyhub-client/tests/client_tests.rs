//! Exercises `Client` through its public surface only: registering a sender,
//! starting the worker pool, sending sync/async/batch, and an idempotent
//! close. Mirrors the way `bin/notifyhub-demo` drives the same facade.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use notifyhub_client::{BatchOptions, Client, SendOptions};
use notifyhub_common::{Format, Message, MessageBuilder, Priority, SendResult, Target, TargetType, ValidationError};
use notifyhub_dispatch::context::DispatchContext;
use notifyhub_dispatch::error::SenderError;
use notifyhub_dispatch::sender::{Capabilities, PlatformSender};

struct CountingSender {
    sent: Arc<AtomicUsize>,
}

#[async_trait]
impl PlatformSender for CountingSender {
    fn name(&self) -> &str {
        "counting"
    }

    async fn send(&self, _ctx: &DispatchContext, _message: &Message, targets: &[Target]) -> Vec<SendResult> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        targets
            .iter()
            .map(|t| SendResult::success(t.clone(), "counting", Duration::ZERO, 1))
            .collect()
    }

    fn validate_target(&self, _target: &Target) -> Result<(), ValidationError> {
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            target_types: [TargetType::Email].into_iter().collect(),
            formats: [Format::Text].into_iter().collect(),
            max_message_size: 4096,
            ..Default::default()
        }
    }

    async fn is_healthy(&self, _ctx: &DispatchContext) -> Result<(), SenderError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), SenderError> {
        Ok(())
    }
}

fn message(title: &str) -> Message {
    MessageBuilder::new()
        .title(title)
        .priority(Priority::Normal)
        .target(Target::new(TargetType::Email, "a@example.com").unwrap())
        .build()
        .unwrap()
}

#[tokio::test]
async fn send_async_handle_resolves_once_the_worker_pool_dispatches_it() {
    let sent = Arc::new(AtomicUsize::new(0));
    let client = Client::builder()
        .register_sender(Arc::new(CountingSender { sent: sent.clone() }))
        .unwrap()
        .build();
    client.start();

    let ctx = DispatchContext::with_timeout(Duration::from_secs(5));
    let handle = client
        .send_async(&ctx, message("async"), SendOptions::default())
        .await
        .unwrap();

    let receipt = tokio::time::timeout(Duration::from_secs(2), handle.result())
        .await
        .expect("handle resolved before timeout")
        .expect("dispatch succeeded");
    assert!(receipt.all_succeeded());
    assert_eq!(sent.load(Ordering::SeqCst), 1);

    client.close().await.unwrap();
}

#[tokio::test]
async fn send_async_batch_resolves_once_every_item_dispatches() {
    let sent = Arc::new(AtomicUsize::new(0));
    let client = Client::builder()
        .register_sender(Arc::new(CountingSender { sent: sent.clone() }))
        .unwrap()
        .build();
    client.start();

    let ctx = DispatchContext::with_timeout(Duration::from_secs(5));
    let messages = vec![message("a"), message("b"), message("c")];
    let batch = client.send_async_batch(&ctx, messages, SendOptions::default()).await.unwrap();

    let results = tokio::time::timeout(Duration::from_secs(2), batch.results())
        .await
        .expect("batch resolved before timeout");
    assert_eq!(results.len(), 3);
    assert!(results
        .iter()
        .all(|r| r.as_ref().unwrap().as_ref().unwrap().all_succeeded()));
    assert_eq!(sent.load(Ordering::SeqCst), 3);

    client.close().await.unwrap();
}

#[tokio::test]
async fn send_after_close_is_rejected_and_close_is_idempotent() {
    let client = Client::builder()
        .register_sender(Arc::new(CountingSender {
            sent: Arc::new(AtomicUsize::new(0)),
        }))
        .unwrap()
        .build();
    client.start();
    client.close().await.unwrap();
    client.close().await.unwrap();

    let ctx = DispatchContext::with_timeout(Duration::from_secs(5));
    let result = client.send(&ctx, &message("too-late")).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn sync_batch_respects_ordering_option() {
    let sent = Arc::new(AtomicUsize::new(0));
    let client = Client::builder()
        .register_sender(Arc::new(CountingSender { sent: sent.clone() }))
        .unwrap()
        .build();

    let ctx = DispatchContext::with_timeout(Duration::from_secs(5));
    let messages = vec![message("a"), message("b")];
    let results = client
        .send_batch(&ctx, &messages, BatchOptions { ordered: true })
        .await;

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(sent.load(Ordering::SeqCst), 2);
}
