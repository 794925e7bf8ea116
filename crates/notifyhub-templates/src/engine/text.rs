//! Hand-rolled `{{ }}`-pipeline template engine.
//!
//! No crate in the ecosystem reproduces Go's `text/template` semantics
//! (dotted variable paths, `if`/`range` blocks, pipe-chained functions), so
//! this is original parsing/rendering logic rather than a wrapper.
//!
//! Supported syntax: `{{ path.to.value }}`, `{{ value | upper | default "x" }}`,
//! `{{if cond}}...{{else}}...{{end}}`, `{{range items}}...{{end}}` with `.`
//! bound to the current loop item inside the block.

use std::collections::HashMap;

use regex::Regex;
use serde_json::Value;

use crate::error::{Result, TemplateError};

use super::{EngineCapabilities, TemplateEngine};

#[derive(Debug, Clone)]
enum Node {
    Text(String),
    Var(Pipeline),
    If { cond: Pipeline, then_branch: Vec<Node>, else_branch: Vec<Node> },
    Range { path: String, body: Vec<Node> },
}

#[derive(Debug, Clone)]
struct Pipeline {
    path: String,
    filters: Vec<Filter>,
}

#[derive(Debug, Clone)]
enum Filter {
    Named(String),
    Default(String),
}

enum Token {
    Text(String),
    Tag(String),
}

fn tokenize(content: &str) -> Vec<Token> {
    let tag_re = Regex::new(r"\{\{\s*(.*?)\s*\}\}").unwrap();
    let mut tokens = Vec::new();
    let mut last_end = 0;
    for m in tag_re.find_iter(content) {
        if m.start() > last_end {
            tokens.push(Token::Text(content[last_end..m.start()].to_string()));
        }
        let inner = &content[m.start() + 2..m.end() - 2];
        tokens.push(Token::Tag(inner.trim().to_string()));
        last_end = m.end();
    }
    if last_end < content.len() {
        tokens.push(Token::Text(content[last_end..].to_string()));
    }
    tokens
}

fn parse_pipeline(raw: &str) -> Pipeline {
    let mut parts = raw.split('|').map(str::trim);
    let path = parts.next().unwrap_or("").to_string();
    let mut filters = Vec::new();
    for part in parts {
        if let Some(rest) = part.strip_prefix("default ") {
            let literal = rest.trim().trim_matches('"').to_string();
            filters.push(Filter::Default(literal));
        } else {
            filters.push(Filter::Named(part.to_string()));
        }
    }
    Pipeline { path, filters }
}

/// Parses a flat token stream into a tree, matching `if`/`range` with `end`.
fn parse_nodes(tokens: &[Token], pos: &mut usize) -> Vec<Node> {
    let mut nodes = Vec::new();
    while *pos < tokens.len() {
        match &tokens[*pos] {
            Token::Text(text) => {
                nodes.push(Node::Text(text.clone()));
                *pos += 1;
            }
            Token::Tag(tag) => {
                if tag == "end" || tag == "else" {
                    return nodes;
                }
                if let Some(cond) = tag.strip_prefix("if ") {
                    *pos += 1;
                    let then_branch = parse_nodes(tokens, pos);
                    let mut else_branch = Vec::new();
                    if *pos < tokens.len() {
                        if let Token::Tag(t) = &tokens[*pos] {
                            if t == "else" {
                                *pos += 1;
                                else_branch = parse_nodes(tokens, pos);
                            }
                        }
                    }
                    if *pos < tokens.len() {
                        *pos += 1; // consume "end"
                    }
                    nodes.push(Node::If {
                        cond: parse_pipeline(cond),
                        then_branch,
                        else_branch,
                    });
                } else if let Some(path) = tag.strip_prefix("range ") {
                    *pos += 1;
                    let body = parse_nodes(tokens, pos);
                    if *pos < tokens.len() {
                        *pos += 1; // consume "end"
                    }
                    nodes.push(Node::Range {
                        path: path.trim().to_string(),
                        body,
                    });
                } else {
                    nodes.push(Node::Var(parse_pipeline(tag)));
                    *pos += 1;
                }
            }
        }
    }
    nodes
}

fn parse(content: &str) -> Vec<Node> {
    let tokens = tokenize(content);
    let mut pos = 0;
    parse_nodes(&tokens, &mut pos)
}

/// Looks up a dotted path against a context stack, innermost scope first.
fn resolve<'a>(path: &str, scopes: &[&'a Value], root: &'a HashMap<String, Value>) -> Option<&'a Value> {
    let path = path.trim_start_matches('.');
    if path.is_empty() {
        return scopes.last().copied();
    }

    if let Some(top) = scopes.last() {
        if let Some(found) = walk(top, path) {
            return Some(found);
        }
    }

    let mut parts = path.splitn(2, '.');
    let head = parts.next()?;
    let rest = parts.next();
    let base = root.get(head)?;
    match rest {
        Some(rest) => walk(base, rest),
        None => Some(base),
    }
}

fn walk<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        if segment.is_empty() {
            continue;
        }
        current = current.get(segment)?;
    }
    Some(current)
}

fn value_to_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
        None => String::new(),
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None => false,
        Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
    }
}

fn apply_filters(mut rendered: String, found: bool, filters: &[Filter]) -> String {
    let mut present = found;
    for filter in filters {
        match filter {
            Filter::Named(name) => {
                rendered = match name.as_str() {
                    "upper" => rendered.to_uppercase(),
                    "lower" => rendered.to_lowercase(),
                    "trim" => rendered.trim().to_string(),
                    "title" => title_case(&rendered),
                    _ => rendered,
                };
            }
            Filter::Default(fallback) => {
                if !present || rendered.is_empty() {
                    rendered = fallback.clone();
                    present = true;
                }
            }
        }
    }
    rendered
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_nodes(nodes: &[Node], scopes: &mut Vec<Value>, root: &HashMap<String, Value>, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Var(pipeline) => {
                let scope_refs: Vec<&Value> = scopes.iter().collect();
                let found = resolve(&pipeline.path, &scope_refs, root);
                let rendered = value_to_string(found);
                out.push_str(&apply_filters(rendered, found.is_some(), &pipeline.filters));
            }
            Node::If { cond, then_branch, else_branch } => {
                let scope_refs: Vec<&Value> = scopes.iter().collect();
                let value = resolve(&cond.path, &scope_refs, root);
                if truthy(value) {
                    render_nodes(then_branch, scopes, root, out);
                } else {
                    render_nodes(else_branch, scopes, root, out);
                }
            }
            Node::Range { path, body } => {
                let items = {
                    let scope_refs: Vec<&Value> = scopes.iter().collect();
                    resolve(path, &scope_refs, root).cloned()
                };
                if let Some(Value::Array(items)) = items {
                    for item in items {
                        scopes.push(item);
                        render_nodes(body, scopes, root, out);
                        scopes.pop();
                    }
                }
            }
        }
    }
}

pub struct TextEngine;

impl TextEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine for TextEngine {
    fn name(&self) -> &'static str {
        "text"
    }

    fn render(&self, content: &str, vars: &HashMap<String, Value>) -> Result<String> {
        let nodes = parse(content);
        let mut scopes = Vec::new();
        let mut out = String::with_capacity(content.len());
        render_nodes(&nodes, &mut scopes, vars, &mut out);
        Ok(out)
    }

    fn validate(&self, content: &str) -> Result<()> {
        let tokens = tokenize(content);
        let mut depth: i32 = 0;
        for token in &tokens {
            if let Token::Tag(tag) = token {
                if tag.starts_with("if ") || tag.starts_with("range ") {
                    depth += 1;
                } else if tag == "end" {
                    depth -= 1;
                    if depth < 0 {
                        return Err(TemplateError::Syntax {
                            name: String::new(),
                            reason: "unmatched {{end}}".to_string(),
                        });
                    }
                }
            }
        }
        if depth != 0 {
            return Err(TemplateError::Syntax {
                name: String::new(),
                reason: "unclosed {{if}} or {{range}} block".to_string(),
            });
        }
        Ok(())
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            supports_partials: false,
            supports_helpers: false,
            supports_sections: true,
            supports_pipelines: true,
        }
    }

    fn extract_variables(&self, content: &str) -> Vec<String> {
        let nodes = parse(content);
        let mut vars = Vec::new();
        collect_variables(&nodes, &mut vars);
        vars
    }
}

fn collect_variables(nodes: &[Node], out: &mut Vec<String>) {
    for node in nodes {
        match node {
            Node::Text(_) => {}
            Node::Var(pipeline) => push_unique(out, &pipeline.path),
            Node::If { cond, then_branch, else_branch } => {
                push_unique(out, &cond.path);
                collect_variables(then_branch, out);
                collect_variables(else_branch, out);
            }
            Node::Range { path, body } => {
                push_unique(out, path);
                collect_variables(body, out);
            }
        }
    }
}

fn push_unique(out: &mut Vec<String>, path: &str) {
    let root = path.split('.').next().unwrap_or(path).to_string();
    if !root.is_empty() && root != "." && !out.contains(&root) {
        out.push(root);
    }
}
