//! Worker pool: N workers, each running up to C concurrent handlers, pulling
//! from a [`RetryQueue`] and driving messages through a [`Dispatcher`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notifyhub_common::{QueueMessage, Receipt};
use notifyhub_queue::{Queue, QueueError, RetryOutcome, RetryQueue};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::context::DispatchContext;
use crate::dispatcher::Dispatcher;
use crate::metrics::MetricsCollector;

/// Terminal (or retrying) result of one dispatch attempt, handed to an
/// optional [`WorkerPool`] outcome hook so a caller-facing layer (e.g. a
/// client's async handles) can be notified without the pool itself knowing
/// about handles.
#[derive(Debug, Clone)]
pub enum WorkerOutcome {
    Completed(Receipt),
    Retrying,
    DeadLettered,
}

pub type OutcomeHook = Arc<dyn Fn(&QueueMessage, &WorkerOutcome) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub workers: usize,
    pub concurrency_per_worker: usize,
    pub poll_timeout: Duration,
    pub handler_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            concurrency_per_worker: 4,
            poll_timeout: Duration::from_secs(1),
            handler_timeout: Duration::from_secs(30),
        }
    }
}

/// Runs `workers * concurrency_per_worker` messages through the dispatcher at
/// once. `start`/`stop` are idempotent; `stop` waits for in-flight handlers
/// to finish before returning.
pub struct WorkerPool<Q: Queue + 'static> {
    queue: Arc<RetryQueue<Q>>,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<MetricsCollector>,
    config: WorkerPoolConfig,
    active_tasks: Arc<AtomicU64>,
    stopping: Arc<AtomicBool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    outcome_hook: Option<OutcomeHook>,
}

impl<Q: Queue + 'static> WorkerPool<Q> {
    pub fn new(
        queue: Arc<RetryQueue<Q>>,
        dispatcher: Arc<Dispatcher>,
        metrics: Arc<MetricsCollector>,
        config: WorkerPoolConfig,
    ) -> Self {
        Self {
            queue,
            dispatcher,
            metrics,
            config,
            active_tasks: Arc::new(AtomicU64::new(0)),
            stopping: Arc::new(AtomicBool::new(false)),
            handles: Mutex::new(Vec::new()),
            outcome_hook: None,
        }
    }

    /// Registers a hook invoked after every dispatch attempt reaches a
    /// conclusion (completed, dead-lettered, or scheduled for retry). Used by
    /// `notifyhub-client` to drive its async handle callbacks without this
    /// crate needing to know what a handle is.
    pub fn with_outcome_hook(mut self, hook: OutcomeHook) -> Self {
        self.outcome_hook = Some(hook);
        self
    }

    /// Spawns `config.workers` poll loops. Safe to call once; calling again
    /// before `stop` adds more loops on top, which is never what a caller
    /// wants, so `Client` guards this behind its own started flag.
    pub fn start(&self) {
        self.stopping.store(false, Ordering::SeqCst);
        let total_capacity = (self.config.workers * self.config.concurrency_per_worker) as u64;
        let mut handles = self.handles.lock();
        for worker_id in 0..self.config.workers {
            let queue = self.queue.clone();
            let dispatcher = self.dispatcher.clone();
            let metrics = self.metrics.clone();
            let config = self.config.clone();
            let active_tasks = self.active_tasks.clone();
            let stopping = self.stopping.clone();
            let outcome_hook = self.outcome_hook.clone();
            handles.push(tokio::spawn(async move {
                run_worker(
                    worker_id,
                    queue,
                    dispatcher,
                    metrics,
                    config,
                    active_tasks,
                    total_capacity,
                    stopping,
                    outcome_hook,
                )
                .await;
            }));
        }
    }

    /// Signals all workers to stop polling and waits for in-flight handlers.
    pub async fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    pub fn active_tasks(&self) -> u64 {
        self.active_tasks.load(Ordering::SeqCst)
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_worker<Q: Queue + 'static>(
    worker_id: usize,
    queue: Arc<RetryQueue<Q>>,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<MetricsCollector>,
    config: WorkerPoolConfig,
    active_tasks: Arc<AtomicU64>,
    total_capacity: u64,
    stopping: Arc<AtomicBool>,
    outcome_hook: Option<OutcomeHook>,
) {
    let semaphore = Arc::new(Semaphore::new(config.concurrency_per_worker));

    while !stopping.load(Ordering::SeqCst) {
        let message = match queue.dequeue(config.poll_timeout).await {
            Ok(message) => message,
            Err(QueueError::Empty) => continue,
            Err(e) => {
                tracing::error!(worker_id, error = %e, "worker stopping after queue error");
                break;
            }
        };
        metrics.record_dequeued();

        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let active = active_tasks.fetch_add(1, Ordering::SeqCst) + 1;
        metrics.set_worker_gauges(active, total_capacity.saturating_sub(active));

        let queue = queue.clone();
        let dispatcher = dispatcher.clone();
        let metrics = metrics.clone();
        let handler_timeout = config.handler_timeout;
        let active_tasks = active_tasks.clone();
        let outcome_hook = outcome_hook.clone();
        tokio::spawn(async move {
            let _permit = permit;
            process_message(message, &queue, &dispatcher, &metrics, handler_timeout, outcome_hook.as_ref()).await;
            let active = active_tasks.fetch_sub(1, Ordering::SeqCst) - 1;
            metrics.set_worker_gauges(active, total_capacity.saturating_sub(active));
        });
    }
}

async fn process_message<Q: Queue + 'static>(
    message: QueueMessage,
    queue: &RetryQueue<Q>,
    dispatcher: &Dispatcher,
    metrics: &MetricsCollector,
    handler_timeout: Duration,
    outcome_hook: Option<&OutcomeHook>,
) {
    let ctx = DispatchContext::with_timeout(handler_timeout);
    let outcome = tokio::time::timeout(handler_timeout, dispatcher.dispatch(&ctx, &message.message)).await;

    let success_receipt = match &outcome {
        Ok(Ok(receipt)) if receipt.all_succeeded() => Some(receipt.clone()),
        Ok(Ok(_)) => None,
        Ok(Err(e)) => {
            tracing::warn!(message_id = %message.message.id, error = %e, "dispatch error");
            None
        }
        Err(_) => {
            tracing::warn!(message_id = %message.message.id, "handler timed out");
            None
        }
    };

    if let Some(receipt) = success_receipt {
        if let Some(hook) = outcome_hook {
            hook(&message, &WorkerOutcome::Completed(receipt));
        }
        return;
    }

    match queue.retry(message.clone()).await {
        Ok(RetryOutcome::Requeued) => {
            metrics.record_retried();
            if let Some(hook) = outcome_hook {
                hook(&message, &WorkerOutcome::Retrying);
            }
        }
        Ok(RetryOutcome::DeadLettered) => {
            metrics.record_dead_lettered();
            if let Some(hook) = outcome_hook {
                hook(&message, &WorkerOutcome::DeadLettered);
            }
        }
        Err(e) => tracing::error!(error = %e, "failed to retry/dead-letter message"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakerRegistry;
    use crate::registry::SenderRegistry;
    use crate::sender::{Capabilities, PlatformSender};
    use async_trait::async_trait;
    use notifyhub_common::{Format, Message, MessageBuilder, Priority, SendResult, Target, TargetType, ValidationError};
    use notifyhub_queue::memory::MemoryQueue;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;

    struct RecordingSender {
        calls: AtomicUsize,
        fail_first_n: usize,
    }

    #[async_trait]
    impl PlatformSender for RecordingSender {
        fn name(&self) -> &str {
            "test"
        }

        async fn send(&self, _ctx: &DispatchContext, _message: &Message, targets: &[Target]) -> Vec<SendResult> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            targets
                .iter()
                .map(|t| {
                    if call < self.fail_first_n {
                        SendResult::failure(t.clone(), "test", "boom", StdDuration::ZERO, 1)
                    } else {
                        SendResult::success(t.clone(), "test", StdDuration::ZERO, 1)
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

        async fn is_healthy(&self, _ctx: &DispatchContext) -> Result<(), crate::error::SenderError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), crate::error::SenderError> {
            Ok(())
        }
    }

    fn test_message() -> QueueMessage {
        let msg: Message = MessageBuilder::new()
            .title("hi")
            .priority(Priority::Normal)
            .target(Target::new(TargetType::Email, "a@example.com").unwrap())
            .build()
            .unwrap();
        QueueMessage::new(msg, 3)
    }

    #[tokio::test]
    async fn successful_message_is_not_requeued() {
        let sender = Arc::new(RecordingSender {
            calls: AtomicUsize::new(0),
            fail_first_n: 0,
        });
        let registry = Arc::new(SenderRegistry::builder().register(sender).unwrap().build());
        let metrics = Arc::new(MetricsCollector::new());
        let dispatcher = Arc::new(
            Dispatcher::new(registry, metrics.clone()).with_circuit_breakers(Arc::new(CircuitBreakerRegistry::new())),
        );
        let dlq: Arc<dyn Queue> = Arc::new(MemoryQueue::new(0));
        let queue = Arc::new(RetryQueue::new(MemoryQueue::new(0), dlq));

        queue.enqueue(test_message()).await.unwrap();
        let pool = WorkerPool::new(queue.clone(), dispatcher, metrics, WorkerPoolConfig::default());
        pool.start();

        tokio::time::sleep(StdDuration::from_millis(100)).await;
        pool.stop().await;

        assert_eq!(queue.len().await, 0);
    }

    #[tokio::test]
    async fn failed_message_is_requeued_for_retry() {
        let sender = Arc::new(RecordingSender {
            calls: AtomicUsize::new(0),
            fail_first_n: 100,
        });
        let registry = Arc::new(SenderRegistry::builder().register(sender).unwrap().build());
        let metrics = Arc::new(MetricsCollector::new());
        let dispatcher = Arc::new(Dispatcher::new(registry, metrics.clone()));
        let dlq: Arc<dyn Queue> = Arc::new(MemoryQueue::new(0));
        let queue = Arc::new(RetryQueue::new(MemoryQueue::new(0), dlq.clone()).with_policy(
            notifyhub_queue::RetryPolicy {
                max_retries: 1,
                initial: StdDuration::from_millis(1),
                multiplier: 1.0,
                max_interval: StdDuration::from_millis(5),
                max_elapsed: StdDuration::from_secs(60),
                jitter_fraction: 0.0,
            },
        ));

        queue.enqueue(test_message()).await.unwrap();
        let pool = WorkerPool::new(queue.clone(), dispatcher, metrics, WorkerPoolConfig::default());
        pool.start();

        tokio::time::sleep(StdDuration::from_millis(300)).await;
        pool.stop().await;

        assert_eq!(dlq.len().await, 1);
    }
}
