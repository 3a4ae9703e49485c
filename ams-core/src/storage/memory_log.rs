use async_trait::async_trait;
use dashmap::{mapref::one::RefMut, DashMap};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, trace};

use super::{LogError, LogReader, LogRetention, Result};
use crate::message::{epoch_millis, Attributes, Message};
use crate::names::TopicName;

#[derive(Debug)]
struct TopicLog {
    // offset of messages.front()
    first_offset: u64,
    messages: VecDeque<Message>,
    tail_tx: watch::Sender<u64>,
}

impl TopicLog {
    fn new() -> Self {
        let (tail_tx, _rx) = watch::channel(0);
        TopicLog {
            first_offset: 0,
            messages: VecDeque::new(),
            tail_tx,
        }
    }

    fn next_offset(&self) -> u64 {
        self.first_offset + self.messages.len() as u64
    }
}

/// MemoryLog is an in-memory topic log implementing both collaborator traits.
/// It stands in for the Kafka backed log in tests and embedded setups.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    topics: Arc<DashMap<TopicName, TopicLog>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        MemoryLog {
            topics: Arc::new(DashMap::new()),
        }
    }

    fn topic_log(&self, topic: &TopicName) -> RefMut<'_, TopicName, TopicLog> {
        self.topics
            .entry(topic.clone())
            .or_insert_with(TopicLog::new)
    }

    /// Publish path: append a message stamped with the current wall clock.
    pub fn append(&self, topic: &TopicName, data: impl Into<String>, attributes: Attributes) -> Message {
        self.append_at(topic, data, attributes, epoch_millis())
    }

    /// Publish path with an explicit publish time (epoch millis).
    pub fn append_at(
        &self,
        topic: &TopicName,
        data: impl Into<String>,
        attributes: Attributes,
        publish_time: u64,
    ) -> Message {
        let mut log = self.topic_log(topic);
        let offset = log.next_offset();
        let msg = Message::new(offset, data, attributes, publish_time);
        log.messages.push_back(msg.clone());

        let next = log.next_offset();
        // Notify tailing readers; send_replace never fails without receivers
        log.tail_tx.send_replace(next);
        trace!(topic = %topic, offset, "appended message");
        msg
    }
}

#[async_trait]
impl LogReader for MemoryLog {
    async fn read_range(&self, topic: &TopicName, from: u64, to: u64) -> Result<Vec<Message>> {
        if from > to {
            return Err(LogError::InvalidRange { from, to });
        }
        let log = self.topic_log(topic);
        let start = from.max(log.first_offset);
        let end = to.min(log.next_offset());
        if start >= end {
            return Ok(Vec::new());
        }
        let skip = (start - log.first_offset) as usize;
        let take = (end - start) as usize;
        Ok(log.messages.iter().skip(skip).take(take).cloned().collect())
    }

    async fn next_offset(&self, topic: &TopicName) -> Result<u64> {
        Ok(self.topic_log(topic).next_offset())
    }

    async fn first_offset(&self, topic: &TopicName) -> Result<u64> {
        Ok(self.topic_log(topic).first_offset)
    }

    async fn offset_for_timestamp(&self, topic: &TopicName, timestamp: u64) -> Result<Option<u64>> {
        let log = self.topic_log(topic);
        Ok(log
            .messages
            .iter()
            .find(|msg| msg.publish_time >= timestamp)
            .map(|msg| msg.offset))
    }

    fn subscribe_appends(&self, topic: &TopicName) -> Result<watch::Receiver<u64>> {
        let log = self.topic_log(topic);
        let rx = log.tail_tx.subscribe();
        // Seed the channel so a fresh receiver observes the current tail
        log.tail_tx.send_replace(log.next_offset());
        Ok(rx)
    }
}

#[async_trait]
impl LogRetention for MemoryLog {
    async fn purge_older_than(&self, topic: &TopicName, cutoff: u64) -> Result<u64> {
        let mut log = self.topic_log(topic);
        let mut purged = 0u64;
        while log
            .messages
            .front()
            .is_some_and(|msg| msg.publish_time < cutoff)
        {
            log.messages.pop_front();
            log.first_offset += 1;
            purged += 1;
        }
        if purged > 0 {
            debug!(topic = %topic, purged, first_offset = log.first_offset, "purged expired messages");
        }
        Ok(log.first_offset)
    }

    async fn drop_topic(&self, topic: &TopicName) -> Result<()> {
        self.topics.remove(topic);
        Ok(())
    }
}
