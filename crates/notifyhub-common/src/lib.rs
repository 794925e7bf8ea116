//! Shared data model, error ontology, and logging setup for NotifyHub.

pub mod error;
pub mod logging;
pub mod model;

pub use error::{ConfigError, ShutdownError, ValidationError};
pub use model::{
    Format, Message, MessageBuilder, Priority, QueueMessage, Receipt, SendResult, Target, TargetType,
};
