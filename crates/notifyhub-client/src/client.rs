//! `Client`: the public sync/async facade. Wires a sender registry, an
//! optional template manager, a retry-capable queue, and a worker pool
//! together behind `send`/`send_async`/`health`/`close`, with an
//! idempotent, timeout-bounded shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use notifyhub_common::{Message, QueueMessage, Receipt};
use notifyhub_dispatch::{
    CircuitBreakerRegistry, Dispatcher, HealthReport, HealthService, HealthThresholds, MetricsCollector, OutcomeHook,
    SenderRegistry, SenderRegistryBuilder, WorkerOutcome, WorkerPool, WorkerPoolConfig,
};
use notifyhub_dispatch::context::DispatchContext;
use notifyhub_dispatch::sender::PlatformSender;
use notifyhub_queue::memory::MemoryQueue;
use notifyhub_queue::{Queue, RetryPolicy, RetryQueue};
use notifyhub_templates::TemplateManager;

use crate::batch::AsyncBatchHandle;
use crate::error::ClientError;
use crate::handle::AsyncHandle;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-call overrides for `send`/`send_async`. All fields optional; a
/// `None` falls back to the message's own priority/retry defaults.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub max_retries: Option<u32>,
}

/// Options for `send_batch`/`send_async_batch`. `ordered: true` (the
/// default) sends items one after another so side effects on a shared
/// downstream (e.g. rate-limited senders) stay in submission order;
/// `ordered: false` fans every item out concurrently.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub ordered: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self { ordered: true }
    }
}

struct HandleEntry {
    handle: AsyncHandle,
    batch: Option<(String, usize)>,
}

pub struct ClientBuilder {
    registry: SenderRegistryBuilder,
    templates: Option<Arc<TemplateManager>>,
    queue: Option<Arc<dyn Queue>>,
    dead_letter_queue: Option<Arc<dyn Queue>>,
    retry_policy: RetryPolicy,
    pool_config: WorkerPoolConfig,
    health_thresholds: HealthThresholds,
    shutdown_timeout: Duration,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            registry: SenderRegistry::builder(),
            templates: None,
            queue: None,
            dead_letter_queue: None,
            retry_policy: RetryPolicy::default(),
            pool_config: WorkerPoolConfig::default(),
            health_thresholds: HealthThresholds::default(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    pub fn register_sender(mut self, sender: Arc<dyn PlatformSender>) -> Result<Self, ClientError> {
        self.registry = self
            .registry
            .register(sender)
            .map_err(|e| ClientError::Dispatch(e.to_string()))?;
        Ok(self)
    }

    pub fn with_templates(mut self, templates: Arc<TemplateManager>) -> Self {
        self.templates = Some(templates);
        self
    }

    pub fn with_queue(mut self, queue: Arc<dyn Queue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_dead_letter_queue(mut self, queue: Arc<dyn Queue>) -> Self {
        self.dead_letter_queue = Some(queue);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_worker_pool_config(mut self, config: WorkerPoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    pub fn with_health_thresholds(mut self, thresholds: HealthThresholds) -> Self {
        self.health_thresholds = thresholds;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn build(self) -> Client {
        let registry = Arc::new(self.registry.build());
        let metrics = Arc::new(MetricsCollector::new());

        let mut dispatcher = Dispatcher::new(registry.clone(), metrics.clone())
            .with_circuit_breakers(Arc::new(CircuitBreakerRegistry::new()));
        if let Some(templates) = self.templates.clone() {
            dispatcher = dispatcher.with_templates(templates);
        }
        let dispatcher = Arc::new(dispatcher);

        let main_queue = self.queue.unwrap_or_else(|| Arc::new(MemoryQueue::new(0)) as Arc<dyn Queue>);
        let dlq = self
            .dead_letter_queue
            .unwrap_or_else(|| Arc::new(MemoryQueue::new(0)) as Arc<dyn Queue>);
        let queue = Arc::new(RetryQueue::new(main_queue, dlq).with_policy(self.retry_policy));

        let handles: Arc<DashMap<String, HandleEntry>> = Arc::new(DashMap::new());
        let batches: Arc<DashMap<String, AsyncBatchHandle>> = Arc::new(DashMap::new());
        let health = Arc::new(HealthService::new(self.health_thresholds));
        let hook = make_outcome_hook(handles.clone(), batches.clone(), health.clone());

        let pool = WorkerPool::new(queue.clone(), dispatcher.clone(), metrics.clone(), self.pool_config)
            .with_outcome_hook(hook);

        Client {
            registry,
            dispatcher,
            queue,
            pool,
            metrics,
            health,
            handles,
            batches,
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            shutdown_timeout: self.shutdown_timeout,
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn make_outcome_hook(
    handles: Arc<DashMap<String, HandleEntry>>,
    batches: Arc<DashMap<String, AsyncBatchHandle>>,
    health: Arc<HealthService>,
) -> OutcomeHook {
    Arc::new(move |queued: &QueueMessage, outcome: &WorkerOutcome| {
        let message_id = queued.message.id.clone();
        let Some((_, entry)) = handles.remove(&message_id) else {
            return;
        };

        let result = match outcome {
            WorkerOutcome::Completed(receipt) => Ok(receipt.clone()),
            WorkerOutcome::Retrying => {
                handles.insert(message_id, entry);
                return;
            }
            WorkerOutcome::DeadLettered => {
                health.warnings().warn(
                    notifyhub_dispatch::warning::WarningCategory::QueueConnectivity,
                    notifyhub_dispatch::warning::WarningSeverity::Error,
                    format!("message {message_id} exhausted its retries and was dead-lettered"),
                    "worker_pool",
                );
                Err(ClientError::Dispatch(
                    "message exhausted its retries and was moved to the dead-letter queue".to_string(),
                ))
            }
        };

        entry.handle.complete(result.clone());
        if let Some((batch_id, index)) = entry.batch {
            let mut evict = false;
            if let Some(batch) = batches.get(&batch_id) {
                batch.record_item(index, result);
                evict = batch.is_complete();
            }
            if evict {
                batches.remove(&batch_id);
            }
        }
    })
}

/// The public facade: sync sends go straight through the dispatcher, async
/// sends are handed to the worker pool and tracked via [`AsyncHandle`].
pub struct Client {
    registry: Arc<SenderRegistry>,
    dispatcher: Arc<Dispatcher>,
    queue: Arc<RetryQueue<Arc<dyn Queue>>>,
    pool: WorkerPool<Arc<dyn Queue>>,
    metrics: Arc<MetricsCollector>,
    health: Arc<HealthService>,
    handles: Arc<DashMap<String, HandleEntry>>,
    batches: Arc<DashMap<String, AsyncBatchHandle>>,
    started: AtomicBool,
    closed: AtomicBool,
    shutdown_timeout: Duration,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Starts the background worker pool. Idempotent; a second call is a
    /// no-op rather than spawning a duplicate set of workers.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.pool.start();
    }

    /// Sends synchronously: renders, dispatches, and returns the receipt
    /// once every target has been attempted.
    pub async fn send(&self, ctx: &DispatchContext, message: &Message) -> Result<Receipt, ClientError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Closed);
        }
        Ok(self.dispatcher.dispatch(ctx, message).await?)
    }

    /// Sends a batch of messages synchronously. `ordered` sends one after
    /// another; otherwise every message dispatches concurrently.
    pub async fn send_batch(
        &self,
        ctx: &DispatchContext,
        messages: &[Message],
        opts: BatchOptions,
    ) -> Vec<Result<Receipt, ClientError>> {
        if opts.ordered {
            let mut out = Vec::with_capacity(messages.len());
            for message in messages {
                out.push(self.send(ctx, message).await);
            }
            out
        } else {
            let futures = messages.iter().map(|message| self.send(ctx, message));
            futures::future::join_all(futures).await
        }
    }

    /// Enqueues `message` for background dispatch and returns a handle the
    /// caller can poll, await, or attach callbacks to. `_ctx` is accepted
    /// for API symmetry with `send`; cancellation of a queued-but-not-yet-
    /// dispatched message goes through `AsyncHandle::cancel`, not `ctx`.
    pub async fn send_async(
        &self,
        _ctx: &DispatchContext,
        message: Message,
        opts: SendOptions,
    ) -> Result<AsyncHandle, ClientError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Closed);
        }

        let handle = AsyncHandle::new(message.id.clone());
        self.handles.insert(
            message.id.clone(),
            HandleEntry {
                handle: handle.clone(),
                batch: None,
            },
        );

        let max_retries = opts.max_retries.unwrap_or(3);
        let queued = QueueMessage::new(message, max_retries);
        if let Err(e) = self.queue.enqueue(queued).await {
            self.handles.remove(&handle.message_id().to_string());
            let err = ClientError::from(e);
            handle.complete(Err(err.clone()));
            return Err(err);
        }
        self.metrics.record_enqueued();
        Ok(handle)
    }

    /// Enqueues every message and returns an [`AsyncBatchHandle`] that
    /// completes once every member handle reaches a terminal state.
    pub async fn send_async_batch(
        &self,
        _ctx: &DispatchContext,
        messages: Vec<Message>,
        opts: SendOptions,
    ) -> Result<AsyncBatchHandle, ClientError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Closed);
        }

        let batch_id = uuid::Uuid::new_v4().to_string();
        let mut handles = Vec::with_capacity(messages.len());
        for (index, message) in messages.into_iter().enumerate() {
            let handle = AsyncHandle::new(message.id.clone());
            self.handles.insert(
                message.id.clone(),
                HandleEntry {
                    handle: handle.clone(),
                    batch: Some((batch_id.clone(), index)),
                },
            );

            let max_retries = opts.max_retries.unwrap_or(3);
            let queued = QueueMessage::new(message, max_retries);
            if let Err(e) = self.queue.enqueue(queued).await {
                self.handles.remove(handle.message_id());
                let err = ClientError::from(e);
                handle.complete(Err(err));
            } else {
                self.metrics.record_enqueued();
            }
            handles.push(handle);
        }

        let batch = AsyncBatchHandle::new(batch_id.clone(), handles);
        self.batches.insert(batch_id, batch.clone());
        Ok(batch)
    }

    /// Combines threshold-based health evaluation with a live reachability
    /// check of every registered sender.
    pub async fn health(&self, ctx: &DispatchContext) -> HealthReport {
        for (name, sender) in self.registry.iter() {
            if let Err(e) = sender.is_healthy(ctx).await {
                self.health.record_error(format!("{name}: {e}"));
            }
        }
        let queue_size = self.queue.len().await as u64;
        self.health.evaluate(&self.metrics.snapshot(queue_size))
    }

    pub fn sender_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Acknowledges a warning raised against the internal warning log
    /// (e.g. a dead-letter event); acknowledged warnings drop out of the
    /// next health report's `issues` list.
    pub fn acknowledge_warning(&self, id: &str) -> bool {
        self.health.warnings().acknowledge(id)
    }

    /// Idempotent, timeout-bounded shutdown: stops accepting new work,
    /// waits for in-flight handlers to drain, closes the queue, then every
    /// sender. Returns `ShutdownTimeout` if draining exceeds the configured
    /// budget; the client is still marked closed either way.
    pub async fn close(&self) -> Result<(), ClientError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let drain = async {
            self.pool.stop().await;
            if let Err(e) = self.queue.close().await {
                tracing::warn!(error = %e, "error closing queue");
            }
            self.registry.close_all().await;
        };

        tokio::time::timeout(self.shutdown_timeout, drain)
            .await
            .map_err(|_| ClientError::ShutdownTimeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use notifyhub_common::{Format, MessageBuilder, Priority, SendResult, Target, TargetType, ValidationError};
    use notifyhub_dispatch::sender::Capabilities;
    use notifyhub_dispatch::error::SenderError;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;

    struct EchoSender {
        fail: bool,
    }

    #[async_trait]
    impl PlatformSender for EchoSender {
        fn name(&self) -> &str {
            "echo"
        }

        async fn send(&self, _ctx: &DispatchContext, _message: &Message, targets: &[Target]) -> Vec<SendResult> {
            targets
                .iter()
                .map(|t| {
                    if self.fail {
                        SendResult::failure(t.clone(), "echo", "boom", StdDuration::ZERO, 1)
                    } else {
                        SendResult::success(t.clone(), "echo", StdDuration::ZERO, 1)
                    }
                })
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

    fn message() -> Message {
        MessageBuilder::new()
            .title("hi")
            .priority(Priority::Normal)
            .target(Target::new(TargetType::Email, "a@example.com").unwrap())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn send_returns_a_receipt_synchronously() {
        let client = Client::builder()
            .register_sender(Arc::new(EchoSender { fail: false }))
            .unwrap()
            .build();

        let receipt = client.send(&DispatchContext::new(), &message()).await.unwrap();
        assert!(receipt.all_succeeded());
    }

    #[tokio::test]
    async fn send_async_completes_the_handle() {
        let client = Client::builder()
            .register_sender(Arc::new(EchoSender { fail: false }))
            .unwrap()
            .build();
        client.start();

        let handle = client
            .send_async(&DispatchContext::new(), message(), SendOptions::default())
            .await
            .unwrap();
        let result = tokio::time::timeout(StdDuration::from_secs(2), handle.result())
            .await
            .expect("handle should complete")
            .unwrap();
        assert!(result.all_succeeded());

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn send_async_batch_completes_once_every_item_finishes() {
        let client = Client::builder()
            .register_sender(Arc::new(EchoSender { fail: false }))
            .unwrap()
            .build();
        client.start();

        let messages = vec![message(), message(), message()];
        let batch = client
            .send_async_batch(&DispatchContext::new(), messages, SendOptions::default())
            .await
            .unwrap();

        let results = tokio::time::timeout(StdDuration::from_secs(2), batch.results())
            .await
            .expect("batch should complete");
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.as_ref().unwrap().is_ok()));

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let client = Client::builder()
            .register_sender(Arc::new(EchoSender { fail: false }))
            .unwrap()
            .build();
        client.start();
        client.close().await.unwrap();
        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn send_after_close_is_rejected() {
        let client = Client::builder()
            .register_sender(Arc::new(EchoSender { fail: false }))
            .unwrap()
            .build();
        client.start();
        client.close().await.unwrap();

        let err = client.send(&DispatchContext::new(), &message()).await.unwrap_err();
        assert!(matches!(err, ClientError::Closed));
    }

    #[tokio::test]
    async fn health_reports_sender_errors() {
        let client = Client::builder()
            .register_sender(Arc::new(EchoSender { fail: true }))
            .unwrap()
            .build();
        let report = client.health(&DispatchContext::new()).await;
        assert_eq!(report.status, notifyhub_dispatch::HealthStatus::Healthy);
        let _ = AtomicUsize::new(0);
    }
}
