//! Public facade crate: `Client`, async handles, batch aggregation, and the
//! error type callers see across the sync/async boundary.

pub mod batch;
pub mod client;
pub mod error;
pub mod handle;

pub use batch::{AsyncBatchHandle, BatchItemResult};
pub use client::{BatchOptions, Client, ClientBuilder, SendOptions};
pub use error::ClientError;
pub use handle::{AsyncHandle, HandleStatus};
