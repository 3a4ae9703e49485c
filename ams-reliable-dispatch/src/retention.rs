use ams_core::message::epoch_millis;
use ams_core::names::{SubscriptionName, TopicName};
use ams_core::storage::{LogReader, LogRetention};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::subscription::Subscription;
use crate::topic::Topic;

/// Outcome of one retention cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub topics_purged: usize,
    pub subscriptions_advanced: usize,
    pub failures: usize,
}

/// RetentionEnforcer periodically purges expired log data and raises the
/// `min` offset of every subscription to the start of its retention window.
#[derive(Debug, Clone)]
pub struct RetentionEnforcer {
    topics: Arc<DashMap<TopicName, Arc<Topic>>>,
    subscriptions: Arc<DashMap<SubscriptionName, Arc<Subscription>>>,
    log: Arc<dyn LogReader>,
    retention_log: Arc<dyn LogRetention>,
    check_interval: Duration,
}

impl RetentionEnforcer {
    pub fn new(
        topics: Arc<DashMap<TopicName, Arc<Topic>>>,
        subscriptions: Arc<DashMap<SubscriptionName, Arc<Subscription>>>,
        log: Arc<dyn LogReader>,
        retention_log: Arc<dyn LogRetention>,
        check_interval: Duration,
    ) -> Self {
        Self {
            topics,
            subscriptions,
            log,
            retention_log,
            check_interval,
        }
    }

    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            // the first tick completes immediately
            let mut ticker = interval(self.check_interval);
            loop {
                ticker.tick().await;
                let report = self.run_cycle(epoch_millis()).await;
                if report.failures > 0 {
                    warn!(target = "retention", failures = report.failures, "retention cycle incomplete, retrying next cycle");
                }
            }
        })
    }

    /// Runs one pass over every topic and subscription as of `now_millis`.
    /// Individual failures are logged and counted, never propagated.
    pub async fn run_cycle(&self, now_millis: u64) -> RetentionReport {
        let mut report = RetentionReport::default();

        // snapshot the registries, no map guard is held across an await
        let topics: Vec<Arc<Topic>> = self.topics.iter().map(|e| Arc::clone(e.value())).collect();
        let subscriptions: Vec<Arc<Subscription>> = self
            .subscriptions
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();

        for topic in &topics {
            let mut keep = topic.ttl();
            for sub in subscriptions.iter().filter(|s| s.topic() == topic.name()) {
                keep = keep.max(sub.retention().await);
            }
            let cutoff = now_millis.saturating_sub(duration_millis(keep));

            match self.retention_log.purge_older_than(topic.name(), cutoff).await {
                Ok(first_offset) => {
                    report.topics_purged += 1;
                    debug!(target = "retention", topic = %topic.name(), cutoff, first_offset, "purged topic log");
                }
                Err(e) => {
                    report.failures += 1;
                    warn!(target = "retention", topic = %topic.name(), error = %e, "failed to purge topic log");
                }
            }
        }

        for sub in &subscriptions {
            if !self.topics.contains_key(sub.topic()) {
                continue;
            }
            match self.enforce_subscription(sub, now_millis).await {
                Ok(true) => report.subscriptions_advanced += 1,
                Ok(false) => {}
                Err(e) => {
                    report.failures += 1;
                    warn!(target = "retention", subscription = %sub.name(), error = %e, "failed to apply retention window");
                }
            }
        }

        if report.subscriptions_advanced > 0 {
            info!(
                target = "retention",
                topics = report.topics_purged,
                subscriptions = report.subscriptions_advanced,
                "retention cycle completed"
            );
        }
        report
    }

    async fn enforce_subscription(&self, sub: &Subscription, now_millis: u64) -> Result<bool> {
        let retention = sub.retention().await;
        let window_start = now_millis.saturating_sub(duration_millis(retention));

        let floor = match self.log.offset_for_timestamp(sub.topic(), window_start).await? {
            Some(offset) => offset,
            // every stored message is older than the window
            None => self.log.next_offset(sub.topic()).await?,
        };
        let new_min = floor.max(self.log.first_offset(sub.topic()).await?);

        let mut state = sub.state.lock().await;
        let moved = state.raise_min(new_min)?;
        if moved {
            debug!(
                target = "retention",
                subscription = %sub.name(),
                min = state.offsets.min(),
                current = state.offsets.current(),
                "raised subscription min offset"
            );
        }
        Ok(moved)
    }
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
