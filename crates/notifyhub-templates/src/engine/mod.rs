//! Template engine contract and the three built-in engines.

pub mod handlebars_engine;
pub mod mustache_engine;
pub mod text;

use std::collections::HashMap;

use serde_json::Value;

use crate::error::Result;

/// What an engine can do, surfaced so the manager can reject templates that
/// need a capability their declared engine lacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineCapabilities {
    pub supports_partials: bool,
    pub supports_helpers: bool,
    pub supports_sections: bool,
    pub supports_pipelines: bool,
}

/// A pluggable rendering backend. Implementations must be pure with respect
/// to `vars` — `render` never mutates its input.
pub trait TemplateEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn render(&self, content: &str, vars: &HashMap<String, Value>) -> Result<String>;

    /// Parse-only check; does not require `vars`.
    fn validate(&self, content: &str) -> Result<()>;

    fn capabilities(&self) -> EngineCapabilities;

    /// Best-effort list of variable names the template references, used to
    /// validate a `required-variable-set` before render.
    fn extract_variables(&self, content: &str) -> Vec<String>;
}

/// Which built-in engine a stored template uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Text,
    Mustache,
    Handlebars,
}

pub fn engine_for(kind: EngineKind) -> Box<dyn TemplateEngine> {
    match kind {
        EngineKind::Text => Box::new(text::TextEngine::new()),
        EngineKind::Mustache => Box::new(mustache_engine::MustacheEngine::new()),
        EngineKind::Handlebars => Box::new(handlebars_engine::HandlebarsEngine::new()),
    }
}
