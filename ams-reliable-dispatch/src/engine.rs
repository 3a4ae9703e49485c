use ams_core::message::{epoch_millis, ReceivedMessage};
use ams_core::names::{SubscriptionName, TopicName};
use ams_core::storage::{LogReader, LogRetention};
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::{wrappers::WatchStream, StreamExt};
use tracing::{debug, info, warn};

use crate::ack_id::AckId;
use crate::config::{EngineConfig, MAX_ACK_DEADLINE_SECS};
use crate::dispatch::DeliveryScheduler;
use crate::errors::{DispatchError, Result};
use crate::offset_tracker::{Offsets, SeekOutcome};
use crate::retention::RetentionEnforcer;
use crate::subscription::{SubMetrics, Subscription, SubscriptionOptions};
use crate::topic::{Topic, TopicOptions};

/// Where a seek repositions a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekTarget {
    Offset(u64),
    /// Epoch milliseconds; resolved to the first message published at or after it.
    Timestamp(u64),
}

/// Per-id outcome of an acknowledge request.
#[derive(Debug, Default)]
pub struct AckReport {
    pub acknowledged: Vec<String>,
    pub failed: Vec<(String, DispatchError)>,
}

impl AckReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Collapses the report into the first failure, if any.
    pub fn into_result(self) -> Result<Vec<String>> {
        match self.failed.into_iter().next() {
            Some((_, err)) => Err(err),
            None => Ok(self.acknowledged),
        }
    }
}

/// DispatchEngine holds the topic and subscription registries and routes
/// pull, acknowledge and seek requests to the owning subscription.
#[derive(Debug, Clone)]
pub struct DispatchEngine {
    config: EngineConfig,
    log: Arc<dyn LogReader>,
    retention_log: Arc<dyn LogRetention>,
    topics: Arc<DashMap<TopicName, Arc<Topic>>>,
    subscriptions: Arc<DashMap<SubscriptionName, Arc<Subscription>>>,
    scheduler: DeliveryScheduler,
}

impl DispatchEngine {
    /// Builds an engine over a log implementing both collaborator traits.
    pub fn new<L>(config: EngineConfig, log: Arc<L>) -> Self
    where
        L: LogReader + LogRetention,
    {
        let reader: Arc<dyn LogReader> = log.clone();
        let retention_log: Arc<dyn LogRetention> = log;
        Self::with_collaborators(config, reader, retention_log)
    }

    pub fn with_collaborators(
        config: EngineConfig,
        log: Arc<dyn LogReader>,
        retention_log: Arc<dyn LogRetention>,
    ) -> Self {
        let scheduler = DeliveryScheduler::new(
            Arc::clone(&log),
            config.pull_timeout,
            config.max_messages_per_pull,
        );
        DispatchEngine {
            config,
            log,
            retention_log,
            topics: Arc::new(DashMap::new()),
            subscriptions: Arc::new(DashMap::new()),
            scheduler,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn create_topic(&self, name: TopicName, options: TopicOptions) -> Result<Arc<Topic>> {
        if !name.is_valid() {
            return Err(DispatchError::InvalidName("topic"));
        }
        match self.topics.entry(name.clone()) {
            Entry::Occupied(_) => Err(DispatchError::TopicAlreadyExists(name.to_string())),
            Entry::Vacant(slot) => {
                let ttl = options.ttl.unwrap_or(self.config.default_topic_ttl);
                let topic = Arc::new(Topic::new(name.clone(), ttl, options.schema, epoch_millis()));
                slot.insert(Arc::clone(&topic));
                info!(topic = %name, ttl_secs = ttl.as_secs(), "topic created");
                Ok(topic)
            }
        }
    }

    /// Deletes the topic and its log data. Bound subscriptions stay registered
    /// but can no longer pull.
    pub async fn delete_topic(&self, name: &TopicName) -> Result<()> {
        if self.topics.remove(name).is_none() {
            return Err(DispatchError::TopicNotFound(name.to_string()));
        }
        self.retention_log.drop_topic(name).await?;
        info!(topic = %name, "topic deleted");
        Ok(())
    }

    pub fn get_topic(&self, name: &TopicName) -> Result<Arc<Topic>> {
        self.topics
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| DispatchError::TopicNotFound(name.to_string()))
    }

    /// Creates a subscription positioned at the current tail of `topic`.
    pub async fn create_subscription(
        &self,
        name: SubscriptionName,
        topic: TopicName,
        options: SubscriptionOptions,
    ) -> Result<Arc<Subscription>> {
        if !name.is_valid() {
            return Err(DispatchError::InvalidName("subscription"));
        }
        if !self.topics.contains_key(&topic) {
            return Err(DispatchError::TopicNotFound(topic.to_string()));
        }
        if self.subscriptions.contains_key(&name) {
            return Err(DispatchError::SubscriptionAlreadyExists(name.to_string()));
        }

        let ack_deadline_secs = options
            .ack_deadline_secs
            .unwrap_or(self.config.default_ack_deadline_secs);
        if ack_deadline_secs > MAX_ACK_DEADLINE_SECS {
            return Err(DispatchError::InvalidArgument("ackDeadlineSeconds".to_string()));
        }
        let retention = options.retention.unwrap_or(self.config.default_retention);
        if retention < self.config.default_retention {
            return Err(DispatchError::InvalidArgument("retentionDuration".to_string()));
        }

        let tail = self.log.next_offset(&topic).await?;

        let subscription = match self.subscriptions.entry(name.clone()) {
            Entry::Occupied(_) => {
                return Err(DispatchError::SubscriptionAlreadyExists(name.to_string()))
            }
            Entry::Vacant(slot) => {
                let subscription = Arc::new(Subscription::new(
                    name.clone(),
                    topic.clone(),
                    tail,
                    ack_deadline_secs,
                    retention,
                    options.mode,
                    epoch_millis(),
                ));
                slot.insert(Arc::clone(&subscription));
                subscription
            }
        };

        // appends between the tail read and the insert were announced before
        // the subscription was registered
        match self.log.next_offset(&topic).await {
            Ok(next_offset) => {
                let moved = subscription.state.lock().await.offsets.grow_max(next_offset);
                if moved {
                    subscription.wake_waiters();
                }
            }
            Err(err) => {
                warn!(subscription = %name, error = %err, "failed to refresh log tail");
            }
        }

        info!(
            subscription = %name,
            topic = %topic,
            offset = tail,
            ack_deadline_secs,
            "subscription created"
        );
        Ok(subscription)
    }

    pub fn delete_subscription(&self, name: &SubscriptionName) -> Result<()> {
        let (_, subscription) = self
            .subscriptions
            .remove(name)
            .ok_or_else(|| DispatchError::SubscriptionNotFound(name.to_string()))?;
        subscription.mark_deleted();
        info!(subscription = %name, "subscription deleted");
        Ok(())
    }

    pub fn get_subscription(&self, name: &SubscriptionName) -> Result<Arc<Subscription>> {
        self.subscriptions
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| DispatchError::SubscriptionNotFound(name.to_string()))
    }

    /// Names of the subscriptions bound to `topic`, sorted.
    pub fn topic_subscriptions(&self, topic: &TopicName) -> Vec<SubscriptionName> {
        let mut names: Vec<SubscriptionName> = self
            .subscriptions
            .iter()
            .filter(|entry| entry.value().topic() == topic)
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Changes the ack deadline applied to subsequent deliveries.
    pub async fn modify_ack_deadline(&self, name: &SubscriptionName, ack_deadline_secs: u32) -> Result<()> {
        if ack_deadline_secs > MAX_ACK_DEADLINE_SECS {
            return Err(DispatchError::InvalidArgument("ackDeadlineSeconds".to_string()));
        }
        let subscription = self.get_subscription(name)?;
        subscription.state.lock().await.ack_deadline_secs = ack_deadline_secs;
        info!(subscription = %name, ack_deadline_secs, "ack deadline modified");
        Ok(())
    }

    /// Reports a new log tail for `topic` and wakes suspended pulls.
    pub async fn grow_max(&self, topic: &TopicName, next_offset: u64) {
        for subscription in self.bound_subscriptions(topic) {
            let moved = subscription.state.lock().await.offsets.grow_max(next_offset);
            if moved {
                subscription.wake_waiters();
            }
        }
        debug!(topic = %topic, max = next_offset, "log tail advanced");
    }

    /// Feeds `grow_max` from the log's append notifications until the log
    /// side of the channel closes.
    pub fn spawn_append_listener(&self, topic: TopicName) -> Result<JoinHandle<()>> {
        let receiver = self.log.subscribe_appends(&topic)?;
        let engine = self.clone();
        Ok(tokio::spawn(async move {
            let mut appends = WatchStream::new(receiver);
            while let Some(next_offset) = appends.next().await {
                engine.grow_max(&topic, next_offset).await;
            }
            debug!(topic = %topic, "append listener stopped");
        }))
    }

    pub async fn pull(
        &self,
        name: &SubscriptionName,
        max_messages: usize,
        return_immediately: bool,
    ) -> Result<Vec<ReceivedMessage>> {
        let subscription = self.get_subscription(name)?;
        if !self.topics.contains_key(subscription.topic()) {
            return Err(DispatchError::TopicNotFound(subscription.topic().to_string()));
        }
        self.scheduler
            .pull(&subscription, max_messages, return_immediately)
            .await
    }

    /// Acknowledges each id independently; one bad id does not void the others.
    pub async fn acknowledge<S: AsRef<str>>(&self, name: &SubscriptionName, ack_ids: &[S]) -> Result<AckReport> {
        let subscription = self.get_subscription(name)?;
        let mut report = AckReport::default();
        let mut reclaimed = false;

        {
            let mut state = subscription.state.lock().await;
            let now = Instant::now();
            for raw in ack_ids {
                let raw = raw.as_ref();
                let outcome = AckId::parse_for(raw, name).and_then(|ack_id| state.acknowledge(&ack_id, now));
                match outcome {
                    Ok(_) => report.acknowledged.push(raw.to_string()),
                    Err(err) => {
                        if matches!(err, DispatchError::AckTimeout) {
                            reclaimed = true;
                            warn!(subscription = %name, ack_id = raw, "ack after deadline");
                        }
                        report.failed.push((raw.to_string(), err));
                    }
                }
            }
            debug!(
                subscription = %name,
                acknowledged = report.acknowledged.len(),
                failed = report.failed.len(),
                current = state.offsets.current(),
                "acknowledge processed"
            );
        }

        if reclaimed {
            subscription.wake_waiters();
        }
        Ok(report)
    }

    pub async fn get_offsets(&self, name: &SubscriptionName) -> Result<Offsets> {
        let subscription = self.get_subscription(name)?;
        let offsets = subscription.state.lock().await.offsets.offsets();
        Ok(offsets)
    }

    /// Repositions the subscription. In-flight deliveries are abandoned and
    /// their ack ids become unknown.
    pub async fn seek(&self, name: &SubscriptionName, target: SeekTarget) -> Result<SeekOutcome> {
        let subscription = self.get_subscription(name)?;

        let outcome = match target {
            SeekTarget::Offset(offset) => {
                subscription.state.lock().await.seek(offset)?;
                SeekOutcome {
                    offset,
                    clamped: false,
                }
            }
            SeekTarget::Timestamp(timestamp) => {
                let resolved = self
                    .log
                    .offset_for_timestamp(subscription.topic(), timestamp)
                    .await?;
                subscription.state.lock().await.seek_to_timestamp(resolved)
            }
        };

        subscription.wake_waiters();
        info!(
            subscription = %name,
            offset = outcome.offset,
            clamped = outcome.clamped,
            "subscription seeked"
        );
        Ok(outcome)
    }

    /// Offset of the first message published at or after `timestamp`.
    pub async fn time_to_offset(&self, name: &SubscriptionName, timestamp: u64) -> Result<u64> {
        let subscription = self.get_subscription(name)?;
        self.log
            .offset_for_timestamp(subscription.topic(), timestamp)
            .await?
            .ok_or(DispatchError::TimestampOutOfBounds(timestamp))
    }

    pub async fn metrics(&self, name: &SubscriptionName) -> Result<SubMetrics> {
        let subscription = self.get_subscription(name)?;
        let metrics = subscription.state.lock().await.metrics.clone();
        Ok(metrics)
    }

    /// A retention enforcer sharing this engine's registries.
    pub fn retention_enforcer(&self) -> Arc<RetentionEnforcer> {
        Arc::new(RetentionEnforcer::new(
            Arc::clone(&self.topics),
            Arc::clone(&self.subscriptions),
            Arc::clone(&self.log),
            Arc::clone(&self.retention_log),
            self.config.retention_check_interval,
        ))
    }

    fn bound_subscriptions(&self, topic: &TopicName) -> Vec<Arc<Subscription>> {
        self.subscriptions
            .iter()
            .filter(|entry| entry.value().topic() == topic)
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}
