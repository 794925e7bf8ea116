//! Core dispatch pipeline: render -> resolve senders -> fan out concurrently
//! -> assemble a receipt -> record metrics.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use indexmap::IndexMap;
use notifyhub_common::{Message, Receipt, SendResult, Target};
use notifyhub_templates::TemplateManager;

use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::context::DispatchContext;
use crate::error::DispatchError;
use crate::metrics::MetricsCollector;
use crate::registry::SenderRegistry;
use crate::sender::PlatformSender;

pub struct Dispatcher {
    registry: Arc<SenderRegistry>,
    templates: Option<Arc<TemplateManager>>,
    breakers: Arc<CircuitBreakerRegistry>,
    metrics: Arc<MetricsCollector>,
}

impl Dispatcher {
    pub fn new(registry: Arc<SenderRegistry>, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            registry,
            templates: None,
            breakers: Arc::new(CircuitBreakerRegistry::new()),
            metrics,
        }
    }

    pub fn with_templates(mut self, templates: Arc<TemplateManager>) -> Self {
        self.templates = Some(templates);
        self
    }

    pub fn with_circuit_breakers(mut self, breakers: Arc<CircuitBreakerRegistry>) -> Self {
        self.breakers = breakers;
        self
    }

    pub fn circuit_breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Renders the message's template (if any) into a working copy, resolves
    /// each target to a sender, fans out one concurrent call per sender, and
    /// reassembles results in the original target order.
    pub async fn dispatch(&self, ctx: &DispatchContext, message: &Message) -> Result<Receipt, DispatchError> {
        let rendered = self.render(message).await?;
        let (resolved, unresolved) = self.group_by_sender(&rendered.targets);

        let mut slots: Vec<Option<SendResult>> = vec![None; rendered.targets.len()];
        for (idx, target) in unresolved {
            slots[idx] = Some(SendResult::failure(
                target,
                "unresolved",
                "no sender accepts this target type",
                Duration::ZERO,
                1,
            ));
        }

        let message_arc = Arc::new(rendered);
        let futures = resolved.into_iter().map(|(_, (sender, indexed_targets))| {
            let message_arc = message_arc.clone();
            let breakers = self.breakers.clone();
            let metrics = self.metrics.clone();
            async move { dispatch_to_sender(ctx, &message_arc, sender, indexed_targets, &breakers, &metrics).await }
        });

        for batch in join_all(futures).await {
            for (idx, result) in batch {
                slots[idx] = Some(result);
            }
        }

        let results = slots
            .into_iter()
            .map(|slot| slot.expect("every target produces exactly one result"))
            .collect();
        Ok(Receipt::new(message_arc.id.clone(), results))
    }

    async fn render(&self, message: &Message) -> Result<Message, DispatchError> {
        let (Some(template_name), Some(templates)) = (&message.template, &self.templates) else {
            return Ok(message.clone());
        };
        let body = templates.render(template_name, &message.variables).await?;
        let mut rendered = message.clone();
        rendered.body = body;
        Ok(rendered)
    }

    /// Groups target indices by resolved sender. An explicit `target.platform`
    /// wins outright; otherwise the registry's earliest-registered-accepting
    /// sender is used. Targets nothing accepts fall into `unresolved`.
    #[allow(clippy::type_complexity)]
    fn group_by_sender(
        &self,
        targets: &[Target],
    ) -> (
        IndexMap<String, (Arc<dyn PlatformSender>, Vec<(usize, Target)>)>,
        Vec<(usize, Target)>,
    ) {
        let mut resolved: IndexMap<String, (Arc<dyn PlatformSender>, Vec<(usize, Target)>)> = IndexMap::new();
        let mut unresolved = Vec::new();

        for (idx, target) in targets.iter().enumerate() {
            let sender = match &target.platform {
                Some(name) => self.registry.get(name),
                None => self.registry.resolve(target.target_type),
            };
            match sender {
                Some(sender) => {
                    resolved
                        .entry(sender.name().to_string())
                        .or_insert_with(|| (sender.clone(), Vec::new()))
                        .1
                        .push((idx, target.clone()));
                }
                None => unresolved.push((idx, target.clone())),
            }
        }

        (resolved, unresolved)
    }
}

async fn dispatch_to_sender(
    ctx: &DispatchContext,
    message: &Message,
    sender: Arc<dyn PlatformSender>,
    indexed_targets: Vec<(usize, Target)>,
    breakers: &CircuitBreakerRegistry,
    metrics: &MetricsCollector,
) -> Vec<(usize, SendResult)> {
    let name = sender.name().to_string();
    let (indices, targets): (Vec<usize>, Vec<Target>) = indexed_targets.into_iter().unzip();

    if !breakers.allow(&name) {
        return indices
            .into_iter()
            .zip(targets)
            .map(|(idx, target)| {
                (
                    idx,
                    SendResult::failure(target, &name, "circuit breaker open", Duration::ZERO, 0),
                )
            })
            .collect();
    }

    let started = Instant::now();
    let results = sender.send(ctx, message, &targets).await;
    let _elapsed = started.elapsed();

    if results.iter().any(|r| r.success) {
        breakers.record_success(&name);
    } else {
        breakers.record_failure(&name);
    }
    for result in &results {
        metrics.record_outcome(result.duration, result.success);
    }

    indices.into_iter().zip(results).collect()
}
