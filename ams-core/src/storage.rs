use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;
use tokio::sync::watch;

use crate::message::Message;
use crate::names::TopicName;

mod memory_log;
pub use memory_log::MemoryLog;

pub type Result<T> = std::result::Result<T, LogError>;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid offset range: {from}..{to}")]
    InvalidRange { from: u64, to: u64 },

    #[error("Log backend error: {0}")]
    Backend(String),
}

/// Read side of the durable, append-only topic log.
///
/// Offsets are dense per topic. `next_offset` is the offset the next publish
/// will receive, so a topic holding offsets `0..10` reports `10`. Offsets below
/// `first_offset` have been purged and are never returned again.
#[async_trait]
pub trait LogReader: Send + Sync + Debug + 'static {
    /// Messages with offsets in `[from, to)`; purged offsets are skipped.
    async fn read_range(&self, topic: &TopicName, from: u64, to: u64) -> Result<Vec<Message>>;

    /// The offset the next appended message will receive.
    async fn next_offset(&self, topic: &TopicName) -> Result<u64>;

    /// The lowest offset still stored.
    async fn first_offset(&self, topic: &TopicName) -> Result<u64>;

    /// Offset of the first stored message with `publish_time >= timestamp`,
    /// or `None` when every stored message is older.
    async fn offset_for_timestamp(&self, topic: &TopicName, timestamp: u64) -> Result<Option<u64>>;

    /// Watch channel carrying the topic's `next_offset` after every append.
    fn subscribe_appends(&self, topic: &TopicName) -> Result<watch::Receiver<u64>>;
}

/// Purge side of the log, driven by the retention enforcer.
#[async_trait]
pub trait LogRetention: Send + Sync + Debug + 'static {
    /// Discard messages published before `cutoff` (epoch millis).
    /// Returns the topic's first retained offset after the purge.
    async fn purge_older_than(&self, topic: &TopicName, cutoff: u64) -> Result<u64>;

    /// Remove every message of a deleted topic.
    async fn drop_topic(&self, topic: &TopicName) -> Result<()>;
}
