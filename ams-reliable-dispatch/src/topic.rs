use ams_core::names::TopicName;
use std::time::Duration;

/// Options accepted when a topic is created; unset fields take engine defaults.
#[derive(Debug, Clone, Default)]
pub struct TopicOptions {
    pub ttl: Option<Duration>,
    pub schema: Option<String>,
}

/// Topic metadata known to the engine. Message storage lives in the log.
#[derive(Debug, Clone)]
pub struct Topic {
    name: TopicName,
    // max age of a message
    ttl: Duration,
    // schema reference, validated outside the engine
    schema: Option<String>,
    created_on: u64,
}

impl Topic {
    pub(crate) fn new(name: TopicName, ttl: Duration, schema: Option<String>, created_on: u64) -> Self {
        Topic {
            name,
            ttl,
            schema,
            created_on,
        }
    }

    pub fn name(&self) -> &TopicName {
        &self.name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn created_on(&self) -> u64 {
        self.created_on
    }
}
