use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue is full")]
    Full,
    #[error("queue is empty")]
    Empty,
    #[error("queue is closed")]
    Closed,
    #[error("invalid queue message: {0}")]
    InvalidMessage(String),
    #[error("backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, QueueError>;

#[cfg(feature = "redis-backend")]
impl From<redis::RedisError> for QueueError {
    fn from(e: redis::RedisError) -> Self {
        QueueError::Backend(e.to_string())
    }
}
