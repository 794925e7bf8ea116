//! Per-client sender registry. An instance value, never process-global —
//! the source's `sync.Once` + package-level registration is the one thing
//! SPEC_FULL.md explicitly calls out for re-architecture (see DESIGN.md).

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use notifyhub_common::TargetType;

use crate::error::RegistryError;
use crate::sender::{Capabilities, PlatformSender};

/// Builds a sender from a merged (defaults + user) config. Config is a
/// typed map of string -> scalar, per SPEC_FULL.md's "typed config struct
/// per platform" redesign of the source's variadic-map options.
pub type SenderFactory = Box<dyn Fn(&HashMap<String, String>) -> Result<Arc<dyn PlatformSender>, String> + Send + Sync>;

/// Validates a merged config before the factory runs.
pub type SenderValidator = Box<dyn Fn(&HashMap<String, String>) -> Result<(), String> + Send + Sync>;

struct Registration {
    sender: Arc<dyn PlatformSender>,
    capabilities: Capabilities,
}

/// Owned by a single `Client`; immutable after construction (readers only),
/// per SPEC_FULL.md's concurrency model. Uses `IndexMap` so
/// "earliest-registered sender wins" target-type tie-breaks are a simple
/// linear scan in insertion order, not an incidental hash-iteration order.
pub struct SenderRegistry {
    entries: IndexMap<String, Registration>,
}

pub struct SenderRegistryBuilder {
    entries: IndexMap<String, Registration>,
}

impl SenderRegistryBuilder {
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Registers an already-constructed sender. Idempotent registration
    /// through a factory (defaults + user config + validator) lives at the
    /// client-construction layer in `notifyhub-client`; this builder takes
    /// the simpler "I already built the sender" path used by tests and the
    /// demo binary.
    pub fn register(mut self, sender: Arc<dyn PlatformSender>) -> Result<Self, RegistryError> {
        let name = sender.name().to_string();
        if self.entries.contains_key(&name) {
            return Err(RegistryError::NameCollision(name));
        }
        let capabilities = sender.capabilities();
        self.entries.insert(name, Registration { sender, capabilities });
        Ok(self)
    }

    pub fn build(self) -> SenderRegistry {
        SenderRegistry { entries: self.entries }
    }
}

impl Default for SenderRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SenderRegistry {
    pub fn builder() -> SenderRegistryBuilder {
        SenderRegistryBuilder::new()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn PlatformSender>> {
        self.entries.get(name).map(|r| r.sender.clone())
    }

    /// First-registered sender (insertion order) whose capabilities accept
    /// `target_type`. Deterministic tie-break per SPEC_FULL.md §4.2.
    pub fn resolve(&self, target_type: TargetType) -> Option<Arc<dyn PlatformSender>> {
        self.entries
            .values()
            .find(|r| r.capabilities.accepts(target_type))
            .map(|r| r.sender.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn PlatformSender>)> {
        self.entries.iter().map(|(name, reg)| (name.as_str(), &reg.sender))
    }

    pub async fn close_all(&self) {
        for (name, reg) in self.entries.iter() {
            if let Err(e) = reg.sender.close().await {
                tracing::warn!(sender = name, error = %e, "error closing sender");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DispatchContext;
    use crate::error::SenderError;
    use async_trait::async_trait;
    use notifyhub_common::{Format, Message, SendResult, Target};

    struct StubSender {
        name: &'static str,
        accepts: TargetType,
    }

    #[async_trait]
    impl PlatformSender for StubSender {
        fn name(&self) -> &str {
            self.name
        }

        async fn send(&self, _ctx: &DispatchContext, _message: &Message, targets: &[Target]) -> Vec<SendResult> {
            targets
                .iter()
                .map(|t| SendResult::success(t.clone(), self.name, std::time::Duration::ZERO, 1))
                .collect()
        }

        fn validate_target(&self, _target: &Target) -> Result<(), notifyhub_common::ValidationError> {
            Ok(())
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities {
                target_types: [self.accepts].into_iter().collect(),
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

    #[test]
    fn registers_reject_name_collisions() {
        let builder = SenderRegistry::builder()
            .register(Arc::new(StubSender { name: "email", accepts: TargetType::Email }))
            .unwrap();
        let err = builder
            .register(Arc::new(StubSender { name: "email", accepts: TargetType::Email }))
            .unwrap_err();
        assert!(matches!(err, RegistryError::NameCollision(_)));
    }

    #[test]
    fn resolve_picks_earliest_registered_sender_on_tie() {
        let registry = SenderRegistry::builder()
            .register(Arc::new(StubSender { name: "first", accepts: TargetType::Webhook }))
            .unwrap()
            .register(Arc::new(StubSender { name: "second", accepts: TargetType::Webhook }))
            .unwrap()
            .build();

        let resolved = registry.resolve(TargetType::Webhook).unwrap();
        assert_eq!(resolved.name(), "first");
    }

    #[test]
    fn resolve_returns_none_when_no_sender_accepts_type() {
        let registry = SenderRegistry::builder()
            .register(Arc::new(StubSender { name: "email", accepts: TargetType::Email }))
            .unwrap()
            .build();
        assert!(registry.resolve(TargetType::Phone).is_none());
    }
}
