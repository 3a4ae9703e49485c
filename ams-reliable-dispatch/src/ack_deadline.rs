use ams_core::names::SubscriptionName;
use std::collections::{BTreeSet, HashMap};
use tokio::time::{Duration, Instant};
use tracing::trace;

use crate::ack_id::AckId;
use crate::errors::{DispatchError, Result};

#[derive(Debug, Clone)]
struct Lease {
    ack_id: AckId,
    deadline: Instant,
}

/// A lease whose deadline passed; its offset is back in the redelivery pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredLease {
    pub ack_id: AckId,
    pub offset: u64,
}

/// AckDeadlineManager owns the in-flight deliveries of one subscription.
///
/// Every leased or reclaimed offset stays in `outstanding` until acknowledged,
/// so the lowest entry is the acknowledgement watermark.
#[derive(Debug)]
pub struct AckDeadlineManager {
    subscription: SubscriptionName,
    // attempt counter, embedded in every ack id
    deliveries: u64,
    // delivery attempt -> live lease
    leases: HashMap<u64, Lease>,
    // live leases ordered by deadline
    deadlines: BTreeSet<(Instant, u64)>,
    // expired attempts still answered with AckTimeout: delivery attempt -> offset
    expired: HashMap<u64, u64>,
    // reclaimed offsets waiting for redelivery
    redelivery: BTreeSet<u64>,
    // leased or reclaimed offsets not yet acknowledged
    outstanding: BTreeSet<u64>,
}

impl AckDeadlineManager {
    pub fn new(subscription: SubscriptionName) -> Self {
        AckDeadlineManager {
            subscription,
            deliveries: 0,
            leases: HashMap::new(),
            deadlines: BTreeSet::new(),
            expired: HashMap::new(),
            redelivery: BTreeSet::new(),
            outstanding: BTreeSet::new(),
        }
    }

    /// Leases `offset` for `ack_deadline` and returns a fresh ack id.
    pub fn lease(&mut self, offset: u64, ack_deadline: Duration, now: Instant) -> AckId {
        self.deliveries += 1;
        let delivery = self.deliveries;
        let ack_id = AckId::new(&self.subscription, offset, delivery);
        let deadline = now + ack_deadline;

        self.redelivery.remove(&offset);
        self.outstanding.insert(offset);
        self.deadlines.insert((deadline, delivery));
        self.leases.insert(
            delivery,
            Lease {
                ack_id: ack_id.clone(),
                deadline,
            },
        );
        trace!(subscription = %self.subscription, offset, delivery, "leased message");
        ack_id
    }

    /// Acknowledges one delivery and returns its offset.
    ///
    /// Acks arriving after the deadline fail with `AckTimeout`; the lease is
    /// expired on the spot and its offset becomes redeliverable.
    pub fn acknowledge(&mut self, ack_id: &AckId, now: Instant) -> Result<u64> {
        let delivery = ack_id.delivery();
        let live_deadline = self
            .leases
            .get(&delivery)
            .filter(|lease| lease.ack_id == *ack_id)
            .map(|lease| lease.deadline);

        match live_deadline {
            Some(deadline) => {
                if now > deadline {
                    self.expire(delivery);
                    return Err(DispatchError::AckTimeout);
                }
                let offset = ack_id.offset();
                self.remove_lease(delivery);
                self.outstanding.remove(&offset);
                // older attempts of this offset are terminal now
                self.expired.retain(|_, expired_offset| *expired_offset != offset);
                trace!(subscription = %self.subscription, offset, delivery, "acknowledged message");
                Ok(offset)
            }
            None => {
                if self.expired.get(&delivery) == Some(&ack_id.offset()) {
                    Err(DispatchError::AckTimeout)
                } else {
                    Err(DispatchError::UnknownAckId(ack_id.to_string()))
                }
            }
        }
    }

    /// Lazily expires every lease whose deadline is before `now`, oldest
    /// deadline first. Dropping the iterator early leaves the remaining leases
    /// for the next sweep.
    pub fn sweep_expired(&mut self, now: Instant) -> SweepExpired<'_> {
        SweepExpired { manager: self, now }
    }

    fn remove_lease(&mut self, delivery: u64) -> Option<Lease> {
        let lease = self.leases.remove(&delivery)?;
        self.deadlines.remove(&(lease.deadline, delivery));
        Some(lease)
    }

    fn expire(&mut self, delivery: u64) -> Option<ExpiredLease> {
        let lease = self.remove_lease(delivery)?;
        let offset = lease.ack_id.offset();
        self.expired.insert(delivery, offset);
        self.redelivery.insert(offset);
        trace!(subscription = %self.subscription, offset, delivery, "lease expired");
        Some(ExpiredLease {
            ack_id: lease.ack_id,
            offset,
        })
    }

    /// Earliest deadline among live leases.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.first().map(|(deadline, _)| *deadline)
    }

    /// Lowest offset still waiting for an acknowledgement.
    pub fn low_watermark(&self) -> Option<u64> {
        self.outstanding.first().copied()
    }

    /// Up to `limit` reclaimed offsets, lowest first. They stay in the pool
    /// until leased again.
    pub fn redeliverable(&self, limit: usize) -> Vec<u64> {
        self.redelivery.iter().take(limit).copied().collect()
    }

    pub fn leased_count(&self) -> usize {
        self.leases.len()
    }

    pub fn redelivery_count(&self) -> usize {
        self.redelivery.len()
    }

    /// Marks `offset` done without a deadline check. Used for offsets whose
    /// payload left the log, so there is nothing to acknowledge.
    pub fn settle(&mut self, offset: u64) {
        let deliveries: Vec<u64> = self
            .leases
            .iter()
            .filter(|(_, lease)| lease.ack_id.offset() == offset)
            .map(|(delivery, _)| *delivery)
            .collect();
        for delivery in deliveries {
            self.remove_lease(delivery);
        }
        self.expired.retain(|_, expired_offset| *expired_offset != offset);
        self.redelivery.remove(&offset);
        self.outstanding.remove(&offset);
        trace!(subscription = %self.subscription, offset, "settled offset");
    }

    /// Forgets every delivery of offsets below `min`; their data is gone.
    pub fn drop_below(&mut self, min: u64) {
        let doomed: Vec<u64> = self
            .leases
            .iter()
            .filter(|(_, lease)| lease.ack_id.offset() < min)
            .map(|(delivery, _)| *delivery)
            .collect();
        for delivery in doomed {
            self.remove_lease(delivery);
        }
        self.expired.retain(|_, offset| *offset >= min);
        self.redelivery = self.redelivery.split_off(&min);
        self.outstanding = self.outstanding.split_off(&min);
    }

    /// Forgets all in-flight state. Used by seeks; the attempt counter keeps
    /// running so earlier ack ids are never reissued.
    pub fn clear(&mut self) {
        self.leases.clear();
        self.deadlines.clear();
        self.expired.clear();
        self.redelivery.clear();
        self.outstanding.clear();
    }
}

/// Iterator returned by [`AckDeadlineManager::sweep_expired`].
pub struct SweepExpired<'a> {
    manager: &'a mut AckDeadlineManager,
    now: Instant,
}

impl Iterator for SweepExpired<'_> {
    type Item = ExpiredLease;

    fn next(&mut self) -> Option<Self::Item> {
        let &(deadline, delivery) = self.manager.deadlines.first()?;
        if deadline >= self.now {
            return None;
        }
        self.manager.expire(delivery)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.manager.leases.len()))
    }
}
