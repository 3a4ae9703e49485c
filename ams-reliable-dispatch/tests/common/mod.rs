//! Shared setup for ams-reliable-dispatch integration tests
#![allow(dead_code)]

use ams_core::message::{Attributes, ReceivedMessage};
use ams_core::names::{SubscriptionName, TopicName};
use ams_core::storage::{LogReader, MemoryLog};
use ams_reliable_dispatch::config::EngineConfig;
use ams_reliable_dispatch::{DispatchEngine, SubscriptionOptions, TopicOptions};
use std::sync::Arc;

pub const PROJECT: &str = "ARGO";

pub fn setup_engine() -> (DispatchEngine, Arc<MemoryLog>) {
    setup_engine_with(EngineConfig::default())
}

pub fn setup_engine_with(config: EngineConfig) -> (DispatchEngine, Arc<MemoryLog>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let log = Arc::new(MemoryLog::new());
    (DispatchEngine::new(config, log.clone()), log)
}

/// Creates `topic` and a pull subscription `sub` bound to it with default options.
pub async fn create_topic_and_subscription(
    engine: &DispatchEngine,
    topic: &str,
    sub: &str,
) -> anyhow::Result<(TopicName, SubscriptionName)> {
    let topic = TopicName::new(PROJECT, topic);
    let sub = SubscriptionName::new(PROJECT, sub);
    engine.create_topic(topic.clone(), TopicOptions::default())?;
    engine
        .create_subscription(sub.clone(), topic.clone(), SubscriptionOptions::default())
        .await?;
    Ok((topic, sub))
}

/// Appends `count` messages and reports the new tail to the engine.
pub async fn publish(engine: &DispatchEngine, log: &MemoryLog, topic: &TopicName, count: usize) -> anyhow::Result<()> {
    for i in 0..count {
        log.append(topic, format!("bWVzc2FnZQ{}", i), Attributes::new());
    }
    engine.grow_max(topic, log.next_offset(topic).await?).await;
    Ok(())
}

/// Like `publish`, with explicit publish times in epoch millis.
pub async fn publish_at(engine: &DispatchEngine, log: &MemoryLog, topic: &TopicName, times: &[u64]) -> anyhow::Result<()> {
    for (i, publish_time) in times.iter().enumerate() {
        log.append_at(topic, format!("bWVzc2FnZQ{}", i), Attributes::new(), *publish_time);
    }
    engine.grow_max(topic, log.next_offset(topic).await?).await;
    Ok(())
}

pub fn offsets_of(received: &[ReceivedMessage]) -> Vec<u64> {
    received.iter().map(|r| r.message.offset).collect()
}

pub fn ack_ids_of(received: &[ReceivedMessage]) -> Vec<String> {
    received.iter().map(|r| r.ack_id.clone()).collect()
}
