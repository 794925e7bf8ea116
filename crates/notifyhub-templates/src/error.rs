use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template not found: {0}")]
    NotFound(String),
    #[error("template {name} exceeds max size ({size} > {max})")]
    TooLarge { name: String, size: usize, max: usize },
    #[error("syntax error in template {name}: {reason}")]
    Syntax { name: String, reason: String },
    #[error("render error in template {name}: {reason}")]
    Render { name: String, reason: String },
    #[error("missing variable {var} required by template {name}")]
    MissingVariable { name: String, var: String },
    #[error("cache backend error: {0}")]
    Cache(String),
    #[error("manager is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TemplateError>;

#[cfg(feature = "redis-cache")]
impl From<redis::RedisError> for TemplateError {
    fn from(e: redis::RedisError) -> Self {
        TemplateError::Cache(e.to_string())
    }
}
