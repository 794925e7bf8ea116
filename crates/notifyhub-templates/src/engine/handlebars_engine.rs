//! Handlebars-style engine (helpers + block helpers), wrapping the
//! `handlebars` crate directly rather than transforming to Mustache —
//! the real crate already implements the superset of Mustache syntax this
//! needs.

use std::collections::HashMap;

use handlebars::Handlebars;
use regex::Regex;
use serde_json::Value;

use crate::error::{Result, TemplateError};

use super::{EngineCapabilities, TemplateEngine};

pub struct HandlebarsEngine {
    registry: Handlebars<'static>,
    var_re: Regex,
}

impl HandlebarsEngine {
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        Self {
            registry,
            var_re: Regex::new(r"\{\{\{?\s*([#/]?)\s*([\w.]+)(?:\s+[^}]*)?\s*\}?\}\}").unwrap(),
        }
    }
}

impl Default for HandlebarsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine for HandlebarsEngine {
    fn name(&self) -> &'static str {
        "handlebars"
    }

    fn render(&self, content: &str, vars: &HashMap<String, Value>) -> Result<String> {
        let data = Value::Object(vars.clone().into_iter().collect());
        self.registry
            .render_template(content, &data)
            .map_err(|e| TemplateError::Render {
                name: String::new(),
                reason: e.to_string(),
            })
    }

    fn validate(&self, content: &str) -> Result<()> {
        handlebars::Template::compile(content)
            .map(|_| ())
            .map_err(|e| TemplateError::Syntax {
                name: String::new(),
                reason: e.to_string(),
            })
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            supports_partials: true,
            supports_helpers: true,
            supports_sections: true,
            supports_pipelines: false,
        }
    }

    fn extract_variables(&self, content: &str) -> Vec<String> {
        let mut vars = Vec::new();
        for cap in self.var_re.captures_iter(content) {
            let tag = &cap[1];
            let path = &cap[2];
            if tag == "/" || path == "else" {
                continue;
            }
            let root = path.split('.').next().unwrap_or(path).to_string();
            if !vars.contains(&root) {
                vars.push(root);
            }
        }
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_simple_variable() {
        let engine = HandlebarsEngine::new();
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), json!("Ada"));
        let out = engine.render("Hello {{name}}", &vars).unwrap();
        assert_eq!(out, "Hello Ada");
    }

    #[test]
    fn renders_each_block_helper() {
        let engine = HandlebarsEngine::new();
        let mut vars = HashMap::new();
        vars.insert("items".to_string(), json!(["a", "b"]));
        let out = engine.render("{{#each items}}[{{this}}]{{/each}}", &vars).unwrap();
        assert_eq!(out, "[a][b]");
    }

    #[test]
    fn validate_rejects_malformed_template() {
        let engine = HandlebarsEngine::new();
        assert!(engine.validate("{{#if unclosed").is_err());
    }
}
