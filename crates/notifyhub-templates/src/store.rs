//! The template store: name -> stored template record.

use chrono::{DateTime, Utc};

use crate::engine::EngineKind;

#[derive(Debug, Clone)]
pub struct TemplateRecord {
    pub name: String,
    pub content: String,
    pub engine: EngineKind,
    pub required_variables: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Content checksum, used by hot reload to detect real changes.
    pub checksum: String,
    pub compiled: bool,
}

impl TemplateRecord {
    pub fn new(name: impl Into<String>, content: String, engine: EngineKind, required_variables: Vec<String>) -> Self {
        let now = Utc::now();
        let checksum = checksum_of(&content);
        Self {
            name: name.into(),
            content,
            engine,
            required_variables,
            created_at: now,
            updated_at: now,
            checksum,
            compiled: true,
        }
    }

    pub fn cache_key(&self, vars_hash: &str) -> String {
        crate::cache::namespaced_key(&self.name, vars_hash)
    }
}

pub fn checksum_of(content: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
