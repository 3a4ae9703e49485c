use ams_core::names::{SubscriptionName, TopicName};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::ack_deadline::{AckDeadlineManager, ExpiredLease};
use crate::ack_id::AckId;
use crate::errors::Result;
use crate::offset_tracker::{OffsetTracker, SeekOutcome};

/// How messages reach the subscriber. Push delivery itself is handled by
/// push workers outside the engine, which pull on the subscription's behalf.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeliveryMode {
    #[default]
    Pull,
    Push,
}

/// Options accepted when a subscription is created; unset fields take engine defaults.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionOptions {
    pub ack_deadline_secs: Option<u32>,
    pub retention: Option<Duration>,
    pub mode: DeliveryMode,
}

/// Consumption metrics of a subscription.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubMetrics {
    #[serde(rename = "number_of_messages")]
    pub messages: u64,
    #[serde(rename = "total_bytes")]
    pub total_bytes: u64,
    // epoch millis of the latest pull
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_consume: Option<u64>,
    // messages per second between the last two pulls
    pub consume_rate: f64,
}

impl SubMetrics {
    pub(crate) fn record_pull(&mut self, count: usize, bytes: usize, now_millis: u64) {
        // the first pull counts as one second
        let elapsed_secs = match self.latest_consume {
            Some(previous) if now_millis > previous => (now_millis - previous) as f64 / 1000.0,
            _ => 1.0,
        };
        self.messages += count as u64;
        self.total_bytes += bytes as u64;
        self.consume_rate = count as f64 / elapsed_secs;
        self.latest_consume = Some(now_millis);
    }
}

/// Mutable state of a subscription, always accessed under its mutex.
#[derive(Debug)]
pub(crate) struct SubscriptionState {
    pub(crate) offsets: OffsetTracker,
    pub(crate) leases: AckDeadlineManager,
    pub(crate) ack_deadline_secs: u32,
    pub(crate) retention: Duration,
    pub(crate) metrics: SubMetrics,
}

impl SubscriptionState {
    pub(crate) fn ack_deadline(&self) -> Duration {
        Duration::from_secs(self.ack_deadline_secs as u64)
    }

    /// Acknowledges one delivery and moves the watermark to the lowest
    /// offset still outstanding.
    pub(crate) fn acknowledge(&mut self, ack_id: &AckId, now: Instant) -> Result<u64> {
        let offset = self.leases.acknowledge(ack_id, now)?;
        self.settle_watermark()?;
        Ok(offset)
    }

    fn settle_watermark(&mut self) -> Result<()> {
        let watermark = self
            .leases
            .low_watermark()
            .unwrap_or(self.offsets.next_delivery());
        if watermark > self.offsets.current() {
            self.offsets.advance(watermark)?;
        }
        Ok(())
    }

    /// Settles offsets no longer in the log, whatever their lease deadline.
    pub(crate) fn settle_purged(&mut self, offsets: &[u64]) -> Result<()> {
        for &offset in offsets {
            self.leases.settle(offset);
        }
        self.settle_watermark()
    }

    pub(crate) fn sweep_expired(&mut self, now: Instant) -> Vec<ExpiredLease> {
        self.leases.sweep_expired(now).collect()
    }

    /// Leases up to `limit` offsets: reclaimed ones first, lowest offset
    /// first, then never-delivered ones in log order.
    pub(crate) fn reserve(&mut self, limit: usize, now: Instant) -> Vec<(AckId, u64)> {
        let ack_deadline = self.ack_deadline();
        let mut reserved = Vec::with_capacity(limit);

        for offset in self.leases.redeliverable(limit) {
            reserved.push((self.leases.lease(offset, ack_deadline, now), offset));
        }
        let fresh: Range<u64> = self.offsets.take_fresh(limit - reserved.len());
        for offset in fresh {
            reserved.push((self.leases.lease(offset, ack_deadline, now), offset));
        }
        reserved
    }

    /// Replay or skip. In-flight deliveries are abandoned.
    pub(crate) fn seek(&mut self, offset: u64) -> Result<()> {
        self.offsets.seek_to_offset(offset)?;
        self.leases.clear();
        Ok(())
    }

    pub(crate) fn seek_to_timestamp(&mut self, resolved: Option<u64>) -> SeekOutcome {
        let outcome = self.offsets.seek_to_timestamp(resolved);
        self.leases.clear();
        outcome
    }

    /// Applies a retention floor. Returns true when `min` moved.
    pub(crate) fn raise_min(&mut self, new_min: u64) -> Result<bool> {
        if !self.offsets.raise_min(new_min) {
            return Ok(false);
        }
        self.leases.drop_below(self.offsets.min());
        self.settle_watermark()?;
        Ok(true)
    }
}

/// A subscription bound to one topic for its whole life.
#[derive(Debug)]
pub struct Subscription {
    name: SubscriptionName,
    topic: TopicName,
    mode: DeliveryMode,
    created_on: u64,
    pub(crate) state: Mutex<SubscriptionState>,
    // wakes suspended pulls on new messages, seeks and reclaimed leases
    pub(crate) wakeup: Notify,
    // set once the subscription leaves the registry
    deleted: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(
        name: SubscriptionName,
        topic: TopicName,
        tail: u64,
        ack_deadline_secs: u32,
        retention: Duration,
        mode: DeliveryMode,
        created_on: u64,
    ) -> Self {
        let state = SubscriptionState {
            offsets: OffsetTracker::at_tail(tail),
            leases: AckDeadlineManager::new(name.clone()),
            ack_deadline_secs,
            retention,
            metrics: SubMetrics::default(),
        };
        Subscription {
            name,
            topic,
            mode,
            created_on,
            state: Mutex::new(state),
            wakeup: Notify::new(),
            deleted: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &SubscriptionName {
        &self.name
    }

    pub fn topic(&self) -> &TopicName {
        &self.topic
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    pub fn created_on(&self) -> u64 {
        self.created_on
    }

    pub async fn ack_deadline_secs(&self) -> u32 {
        self.state.lock().await.ack_deadline_secs
    }

    pub async fn retention(&self) -> Duration {
        self.state.lock().await.retention
    }

    pub(crate) fn wake_waiters(&self) {
        self.wakeup.notify_waiters();
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    /// Flags the subscription as deleted and releases suspended pulls.
    pub(crate) fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
        self.wake_waiters();
    }
}
