//! `TemplateManager`: register/render/validate/list/get/remove/close over a
//! concurrent `TemplateStore`, with optional cache-first rendering.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::cache::TemplateCache;
use crate::engine::{engine_for, EngineKind, TemplateEngine};
use crate::error::{Result, TemplateError};
use crate::store::{checksum_of, TemplateRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    Off,
    Syntax,
}

pub struct TemplateManagerConfig {
    pub max_template_size: usize,
    pub validation_mode: ValidationMode,
    pub cache_ttl: Duration,
}

impl Default for TemplateManagerConfig {
    fn default() -> Self {
        Self {
            max_template_size: 64 * 1024,
            validation_mode: ValidationMode::Syntax,
            cache_ttl: Duration::from_secs(300),
        }
    }
}

pub struct TemplateManager {
    store: DashMap<String, TemplateRecord>,
    cache: Option<Arc<dyn TemplateCache>>,
    config: TemplateManagerConfig,
    closed: AtomicBool,
}

impl TemplateManager {
    pub fn new(config: TemplateManagerConfig) -> Self {
        Self {
            store: DashMap::new(),
            cache: None,
            config,
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn TemplateCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TemplateError::Closed);
        }
        Ok(())
    }

    pub fn register(&self, name: impl Into<String>, content: impl Into<String>, engine_kind: EngineKind) -> Result<()> {
        self.ensure_open()?;
        let name = name.into();
        let content = content.into();

        if content.len() > self.config.max_template_size {
            return Err(TemplateError::TooLarge {
                name,
                size: content.len(),
                max: self.config.max_template_size,
            });
        }

        let engine = engine_for(engine_kind);
        if self.config.validation_mode != ValidationMode::Off {
            engine.validate(&content).map_err(|e| match e {
                TemplateError::Syntax { reason, .. } => TemplateError::Syntax {
                    name: name.clone(),
                    reason,
                },
                other => other,
            })?;
        }

        let required_variables = engine.extract_variables(&content);
        let record = TemplateRecord::new(name.clone(), content, engine_kind, required_variables);
        self.store.insert(name, record);
        Ok(())
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        let record = self
            .store
            .get(name)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))?;
        let engine = engine_for(record.engine);
        engine.validate(&record.content).map_err(|e| match e {
            TemplateError::Syntax { reason, .. } => TemplateError::Syntax {
                name: name.to_string(),
                reason,
            },
            other => other,
        })
    }

    pub async fn render(&self, name: &str, vars: &HashMap<String, Value>) -> Result<String> {
        self.ensure_open()?;
        let record = self
            .store
            .get(name)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))?
            .clone();

        for required in &record.required_variables {
            if required.starts_with('.') || required.is_empty() {
                continue;
            }
            if !vars.contains_key(required) {
                return Err(TemplateError::MissingVariable {
                    name: name.to_string(),
                    var: required.clone(),
                });
            }
        }

        let vars_hash = hash_vars(vars);
        let cache_key = record.cache_key(&vars_hash);

        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(&cache_key).await {
                return Ok(cached);
            }
        }

        let engine: Box<dyn TemplateEngine> = engine_for(record.engine);
        let rendered = engine.render(&record.content, vars).map_err(|e| match e {
            TemplateError::Render { reason, .. } => TemplateError::Render {
                name: name.to_string(),
                reason,
            },
            other => other,
        })?;

        if let Some(cache) = &self.cache {
            cache.set(&cache_key, rendered.clone(), self.config.cache_ttl).await?;
        }

        Ok(rendered)
    }

    pub fn list(&self) -> Vec<String> {
        self.store.iter().map(|e| e.key().clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<TemplateRecord> {
        self.store.get(name).map(|e| e.value().clone())
    }

    pub fn remove(&self, name: &str) -> bool {
        self.store.remove(name).is_some()
    }

    /// Replaces a template's content in place, bumping `updated_at`, for use
    /// by the hot-reload watcher. Returns `true` if the checksum actually
    /// changed (a no-op reload does not invalidate the cache).
    pub(crate) fn reload_content(&self, name: &str, content: String, engine_kind: EngineKind) -> Result<bool> {
        let new_checksum = checksum_of(&content);
        if let Some(existing) = self.store.get(name) {
            if existing.checksum == new_checksum {
                return Ok(false);
            }
        }

        self.register(name, content, engine_kind)?;
        Ok(true)
    }

    pub async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(cache) = &self.cache {
            cache.clear().await?;
        }
        Ok(())
    }
}

fn hash_vars(vars: &HashMap<String, Value>) -> String {
    let mut keys: Vec<&String> = vars.keys().collect();
    keys.sort();
    let mut hasher = Sha256::new();
    for key in keys {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(vars[key].to_string().as_bytes());
        hasher.update(b";");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryCache;
    use serde_json::json;

    fn vars(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().cloned().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[tokio::test]
    async fn register_then_render_substitutes_variables() {
        let manager = TemplateManager::new(TemplateManagerConfig::default());
        manager.register("welcome", "Hello {{name}}", EngineKind::Text).unwrap();
        let rendered = manager.render("welcome", &vars(&[("name", json!("Ada"))])).await.unwrap();
        assert_eq!(rendered, "Hello Ada");
    }

    #[tokio::test]
    async fn render_is_cache_first_when_cache_configured() {
        let cache = Arc::new(MemoryCache::new(10));
        let manager = TemplateManager::new(TemplateManagerConfig::default()).with_cache(cache.clone());
        manager.register("welcome", "Hello {{name}}", EngineKind::Text).unwrap();

        let first = manager.render("welcome", &vars(&[("name", json!("Ada"))])).await.unwrap();
        let second = manager.render("welcome", &vars(&[("name", json!("Ada"))])).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "Hello Ada");
    }

    #[tokio::test]
    async fn render_missing_required_variable_errors() {
        let manager = TemplateManager::new(TemplateManagerConfig::default());
        manager.register("welcome", "Hello {{name}}", EngineKind::Text).unwrap();
        let err = manager.render("welcome", &vars(&[])).await.unwrap_err();
        assert!(matches!(err, TemplateError::MissingVariable { .. }));
    }

    #[tokio::test]
    async fn render_unknown_template_errors() {
        let manager = TemplateManager::new(TemplateManagerConfig::default());
        let err = manager.render("missing", &vars(&[])).await.unwrap_err();
        assert!(matches!(err, TemplateError::NotFound(_)));
    }

    #[test]
    fn register_rejects_oversized_template() {
        let manager = TemplateManager::new(TemplateManagerConfig {
            max_template_size: 4,
            ..Default::default()
        });
        let err = manager.register("big", "way too long", EngineKind::Text).unwrap_err();
        assert!(matches!(err, TemplateError::TooLarge { .. }));
    }

    #[test]
    fn remove_and_list_reflect_store_state() {
        let manager = TemplateManager::new(TemplateManagerConfig::default());
        manager.register("a", "x", EngineKind::Text).unwrap();
        manager.register("b", "y", EngineKind::Text).unwrap();
        assert_eq!(manager.list().len(), 2);
        assert!(manager.remove("a"));
        assert_eq!(manager.list(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn operations_after_close_fail() {
        let manager = TemplateManager::new(TemplateManagerConfig::default());
        manager.register("a", "x", EngineKind::Text).unwrap();
        manager.close().await.unwrap();
        assert!(matches!(manager.validate("a"), Err(TemplateError::Closed)));
    }
}
