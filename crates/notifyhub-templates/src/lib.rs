//! Name -> template store with pluggable rendering engines, optional
//! multi-layer caching, and optional file-watch hot reload.

pub mod cache;
pub mod engine;
pub mod error;
#[cfg(feature = "hot-reload")]
pub mod hot_reload;
pub mod manager;
pub mod store;

pub use engine::{engine_for, EngineCapabilities, EngineKind, TemplateEngine};
pub use error::{Result, TemplateError};
pub use manager::{TemplateManager, TemplateManagerConfig, ValidationMode};
pub use store::TemplateRecord;
