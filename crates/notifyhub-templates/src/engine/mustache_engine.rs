//! Logic-less Mustache engine, wrapping the `mustache` crate.

use std::collections::HashMap;

use regex::Regex;
use serde_json::Value;

use crate::error::{Result, TemplateError};

use super::{EngineCapabilities, TemplateEngine};

pub struct MustacheEngine {
    var_re: Regex,
}

impl MustacheEngine {
    pub fn new() -> Self {
        Self {
            var_re: Regex::new(r"\{\{\{?\s*([#^/>]?)\s*([\w.]+)\s*\}?\}\}").unwrap(),
        }
    }
}

impl Default for MustacheEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine for MustacheEngine {
    fn name(&self) -> &'static str {
        "mustache"
    }

    fn render(&self, content: &str, vars: &HashMap<String, Value>) -> Result<String> {
        let template = mustache::compile_str(content).map_err(|e| TemplateError::Syntax {
            name: String::new(),
            reason: e.to_string(),
        })?;
        let data = Value::Object(vars.clone().into_iter().collect());
        template.render_to_string(&data).map_err(|e| TemplateError::Render {
            name: String::new(),
            reason: e.to_string(),
        })
    }

    fn validate(&self, content: &str) -> Result<()> {
        mustache::compile_str(content)
            .map(|_| ())
            .map_err(|e| TemplateError::Syntax {
                name: String::new(),
                reason: e.to_string(),
            })
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            supports_partials: true,
            supports_helpers: false,
            supports_sections: true,
            supports_pipelines: false,
        }
    }

    fn extract_variables(&self, content: &str) -> Vec<String> {
        let mut vars = Vec::new();
        for cap in self.var_re.captures_iter(content) {
            let tag = &cap[1];
            let path = &cap[2];
            if tag == "/" {
                continue; // closing tag, not a reference
            }
            let root = path.split('.').next().unwrap_or(path).to_string();
            if !vars.contains(&root) {
                vars.push(root);
            }
        }
        vars
    }
}
