//! Pluggable render-result caches: memory, Redis, and a multi-layer chain.

pub mod memory;
pub mod multi;
#[cfg(feature = "redis-cache")]
pub mod redis_cache;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// A cache of rendered template output, keyed `template:<name>:<vars-hash>`.
#[async_trait]
pub trait TemplateCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
    /// Wipes only entries under the `template:` namespace.
    async fn clear(&self) -> Result<()>;
}

pub const NAMESPACE_PREFIX: &str = "template:";

pub fn namespaced_key(name: &str, vars_hash: &str) -> String {
    format!("{NAMESPACE_PREFIX}{name}:{vars_hash}")
}
