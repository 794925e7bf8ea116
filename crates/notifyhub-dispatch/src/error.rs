use thiserror::Error;

#[derive(Debug, Error)]
pub enum SenderError {
    #[error("sender configuration invalid: {0}")]
    Config(String),
    #[error("sender unreachable: {0}")]
    Unreachable(String),
    #[error("operation cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("sender name collision: {0}")]
    NameCollision(String),
    #[error("sender not found: {0}")]
    NotFound(String),
    #[error("sender factory failed for {name}: {reason}")]
    FactoryFailed { name: String, reason: String },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Validation(#[from] notifyhub_common::ValidationError),
    #[error(transparent)]
    Template(#[from] notifyhub_templates::TemplateError),
    #[error("dispatcher is closed")]
    Closed,
}
