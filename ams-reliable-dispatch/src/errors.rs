use ams_core::storage::LogError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DispatchError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Offset {offset} out of bounds [{min}, {max}]")]
    InvalidOffset { offset: u64, min: u64, max: u64 },

    #[error("ack timeout")]
    AckTimeout,

    #[error("Unknown ack id: {0}")]
    UnknownAckId(String),

    #[error("Invalid ack id: {0}")]
    InvalidAckId(String),

    #[error("Timestamp {0} is out of bounds for the subscription's topic")]
    TimestampOutOfBounds(u64),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("Subscription already exists: {0}")]
    SubscriptionAlreadyExists(String),

    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    #[error("Topic already exists: {0}")]
    TopicAlreadyExists(String),

    #[error("Invalid {0} name")]
    InvalidName(&'static str),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage error: {0}")]
    Storage(#[from] LogError),
}
