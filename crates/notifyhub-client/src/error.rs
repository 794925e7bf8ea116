use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] notifyhub_common::ValidationError),
    #[error("dispatch failed: {0}")]
    Dispatch(String),
    #[error("queue error: {0}")]
    Queue(String),
    #[error("client is closed")]
    Closed,
    #[error("operation timed out waiting for close")]
    ShutdownTimeout,
}

impl From<notifyhub_dispatch::DispatchError> for ClientError {
    fn from(e: notifyhub_dispatch::DispatchError) -> Self {
        match e {
            notifyhub_dispatch::DispatchError::Validation(v) => ClientError::Validation(v),
            other => ClientError::Dispatch(other.to_string()),
        }
    }
}

impl From<notifyhub_queue::QueueError> for ClientError {
    fn from(e: notifyhub_queue::QueueError) -> Self {
        ClientError::Queue(e.to_string())
    }
}
