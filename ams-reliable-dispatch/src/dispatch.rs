use ams_core::message::{epoch_millis, Message, ReceivedMessage};
use ams_core::storage::LogReader;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use crate::ack_id::AckId;
use crate::errors::{DispatchError, Result};
use crate::subscription::Subscription;

// lease expiry is strict, so wake just after the earliest deadline
const DEADLINE_SLACK: Duration = Duration::from_millis(1);

/// DeliveryScheduler serves pulls: it reclaims expired leases, picks the next
/// batch of offsets, leases them and fetches their payloads from the log.
#[derive(Debug, Clone)]
pub struct DeliveryScheduler {
    log: Arc<dyn LogReader>,
    // server side bound of a blocking pull
    pull_timeout: Duration,
    // cap applied to maxMessages
    max_messages_per_pull: usize,
}

impl DeliveryScheduler {
    pub fn new(log: Arc<dyn LogReader>, pull_timeout: Duration, max_messages_per_pull: usize) -> Self {
        Self {
            log,
            pull_timeout,
            // zero would make every pull empty
            max_messages_per_pull: max_messages_per_pull.max(1),
        }
    }

    /// Pulls up to `max_messages` messages.
    ///
    /// With `return_immediately == false` and nothing to deliver, the call
    /// waits for new messages, a lease expiry or the pull timeout, whichever
    /// comes first, and then returns what is available (possibly nothing).
    /// Dropping the future while it waits has no side effects. A pull on a
    /// subscription deleted meanwhile fails with `SubscriptionNotFound`.
    pub async fn pull(
        &self,
        subscription: &Subscription,
        max_messages: usize,
        return_immediately: bool,
    ) -> Result<Vec<ReceivedMessage>> {
        let limit = max_messages.clamp(1, self.max_messages_per_pull);
        let give_up_at = Instant::now() + self.pull_timeout;

        loop {
            let notified = subscription.wakeup.notified();
            tokio::pin!(notified);

            let (reserved, next_deadline) = {
                let mut state = subscription.state.lock().await;
                // register interest before releasing the lock so no wakeup is lost
                notified.as_mut().enable();
                if subscription.is_deleted() {
                    return Err(DispatchError::SubscriptionNotFound(subscription.name().to_string()));
                }

                let now = Instant::now();
                let expired = state.sweep_expired(now);
                if !expired.is_empty() {
                    debug!(
                        subscription = %subscription.name(),
                        expired = expired.len(),
                        "reclaimed expired leases"
                    );
                }
                let reserved = state.reserve(limit, now);
                (reserved, state.leases.next_deadline())
            };

            if !reserved.is_empty() {
                let received = self.fetch(subscription, reserved).await?;
                // an empty fetch means every reserved offset was purged; look again
                if !received.is_empty() || return_immediately {
                    self.record_pull(subscription, &received).await;
                    return Ok(received);
                }
                continue;
            }

            if return_immediately || Instant::now() >= give_up_at {
                self.record_pull(subscription, &[]).await;
                return Ok(Vec::new());
            }

            let wake_at = next_deadline
                .map(|deadline| (deadline + DEADLINE_SLACK).min(give_up_at))
                .unwrap_or(give_up_at);
            trace!(subscription = %subscription.name(), "pull waiting for messages");

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    /// Reads the payloads of the reserved offsets, keeping reservation order.
    async fn fetch(
        &self,
        subscription: &Subscription,
        reserved: Vec<(AckId, u64)>,
    ) -> Result<Vec<ReceivedMessage>> {
        let offsets: Vec<u64> = reserved.iter().map(|(_, offset)| *offset).collect();

        let mut messages: HashMap<u64, Message> = HashMap::with_capacity(reserved.len());
        for run in contiguous_runs(&offsets) {
            let batch = self
                .log
                .read_range(subscription.topic(), run.start, run.end)
                .await
                .map_err(|e| {
                    // leases stay in place and expire into redelivery
                    warn!(
                        subscription = %subscription.name(),
                        from = run.start,
                        to = run.end,
                        error = %e,
                        "failed to read messages from log"
                    );
                    e
                })?;
            messages.extend(batch.into_iter().map(|msg| (msg.offset, msg)));
        }

        let mut received = Vec::with_capacity(reserved.len());
        let mut purged = Vec::new();
        for (ack_id, offset) in reserved {
            match messages.remove(&offset) {
                Some(message) => received.push(ReceivedMessage {
                    ack_id: ack_id.to_string(),
                    message,
                }),
                None => purged.push(offset),
            }
        }

        if !purged.is_empty() {
            // nothing left to deliver for these offsets, settle them right away
            subscription.state.lock().await.settle_purged(&purged)?;
            debug!(
                subscription = %subscription.name(),
                purged = purged.len(),
                "skipped offsets no longer in the log"
            );
        }

        Ok(received)
    }

    async fn record_pull(&self, subscription: &Subscription, received: &[ReceivedMessage]) {
        let bytes: usize = received.iter().map(|r| r.message.size()).sum();
        let mut state = subscription.state.lock().await;
        state.metrics.record_pull(received.len(), bytes, epoch_millis());
    }
}

/// Groups offsets into half-open runs of consecutive values, in input order.
pub(crate) fn contiguous_runs(offsets: &[u64]) -> Vec<Range<u64>> {
    let mut runs: Vec<Range<u64>> = Vec::new();
    for &offset in offsets {
        match runs.last_mut() {
            Some(run) if run.end == offset => run.end += 1,
            _ => runs.push(offset..offset + 1),
        }
    }
    runs
}
