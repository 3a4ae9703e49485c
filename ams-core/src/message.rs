use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

/// User-defined key/value attributes, serialized with sorted keys.
pub type Attributes = BTreeMap<String, String>;

/// A message as stored in a topic log. Immutable once published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    // Identifies the message within its topic; the decimal form of the offset
    pub message_id: String,
    // Position of the message within the topic log
    #[serde(skip)]
    pub offset: u64,
    // User-defined properties/attributes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
    // Opaque base64 payload, never decoded by the engine
    pub data: String,
    // Epoch milliseconds assigned when the message was written
    pub publish_time: u64,
}

impl Message {
    pub fn new(offset: u64, data: impl Into<String>, attributes: Attributes, publish_time: u64) -> Self {
        Message {
            message_id: offset.to_string(),
            offset,
            attributes,
            data: data.into(),
            publish_time,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "message_id:_{}_offset:_{}_publish_time:_{}",
            self.message_id, self.offset, self.publish_time
        )
    }
}

/// One delivery attempt handed to a pulling client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedMessage {
    pub ack_id: String,
    pub message: Message,
}

/// Wire shape of a pull response: `{"receivedMessages": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedMessages {
    pub received_messages: Vec<ReceivedMessage>,
}

impl ReceivedMessages {
    /// Total payload bytes of the batch.
    pub fn total_size(&self) -> usize {
        self.received_messages
            .iter()
            .map(|received| received.message.size())
            .sum()
    }
}

impl From<Vec<ReceivedMessage>> for ReceivedMessages {
    fn from(received_messages: Vec<ReceivedMessage>) -> Self {
        ReceivedMessages { received_messages }
    }
}

/// Wall clock in epoch milliseconds, the unit of `publish_time`.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
