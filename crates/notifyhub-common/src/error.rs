//! Shared error ontology (spec §7): config, validation, queue, and shutdown
//! errors that every crate in the workspace re-uses or wraps.

use thiserror::Error;

pub use crate::model::ValidationError;

/// Errors raised while constructing a client, registering a sender, or
/// registering a template — all fatal to whatever is being built.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    MissingSetting(String),
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("name collision on registration: {0}")]
    NameCollision(String),
}

/// A stable error returned by any operation invoked after `close()`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("operation attempted after shutdown")]
pub struct ShutdownError;
