use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::errors::{DispatchError, Result};

/// Offset indices of a subscription as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offsets {
    pub max: u64,
    pub min: u64,
    pub current: u64,
}

/// Result of a seek. `clamped` is set when the requested position fell outside
/// `[min, max]`, typically because the data it pointed at was already purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekOutcome {
    pub offset: u64,
    pub clamped: bool,
}

/// OffsetTracker holds the offset window of one subscription.
///
/// - `min`: lowest offset still retrievable
/// - `current`: lowest offset not yet acknowledged
/// - `next_delivery`: first offset never handed out
/// - `max`: exclusive end of the topic log as last reported
///
/// `min <= current <= next_delivery <= max` holds after every mutation.
#[derive(Debug, Clone)]
pub struct OffsetTracker {
    min: u64,
    max: u64,
    current: u64,
    next_delivery: u64,
}

impl OffsetTracker {
    /// A tracker positioned at the tail of the log, as for a new subscription.
    pub fn at_tail(tail: u64) -> Self {
        OffsetTracker {
            min: tail,
            max: tail,
            current: tail,
            next_delivery: tail,
        }
    }

    pub fn offsets(&self) -> Offsets {
        Offsets {
            max: self.max,
            min: self.min,
            current: self.current,
        }
    }

    pub fn min(&self) -> u64 {
        self.min
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn next_delivery(&self) -> u64 {
        self.next_delivery
    }

    fn check_bounds(&self, offset: u64) -> Result<()> {
        if offset < self.min || offset > self.max {
            return Err(DispatchError::InvalidOffset {
                offset,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    fn debug_check_invariant(&self) {
        debug_assert!(
            self.min <= self.current && self.current <= self.next_delivery && self.next_delivery <= self.max,
            "offset invariant violated: min={} current={} next_delivery={} max={}",
            self.min,
            self.current,
            self.next_delivery,
            self.max
        );
    }

    /// Moves the acknowledgement watermark to `to`.
    pub fn advance(&mut self, to: u64) -> Result<()> {
        self.check_bounds(to)?;
        self.current = to;
        self.next_delivery = self.next_delivery.max(to);
        self.debug_check_invariant();
        Ok(())
    }

    /// Repositions both the watermark and the delivery cursor. Used for
    /// replay (`offset < current`) and skip (`offset > current`).
    pub fn seek_to_offset(&mut self, offset: u64) -> Result<()> {
        self.check_bounds(offset)?;
        self.current = offset;
        self.next_delivery = offset;
        self.debug_check_invariant();
        Ok(())
    }

    /// Seeks to an offset resolved from a timestamp. `resolved` is the first
    /// log offset published at or after the timestamp, `None` when every
    /// message is older. Out of range results are clamped, never rejected.
    pub fn seek_to_timestamp(&mut self, resolved: Option<u64>) -> SeekOutcome {
        let wanted = resolved.unwrap_or(self.max);
        let offset = wanted.clamp(self.min, self.max);
        self.current = offset;
        self.next_delivery = offset;
        self.debug_check_invariant();
        SeekOutcome {
            offset,
            clamped: offset != wanted,
        }
    }

    /// Records a new log tail. Returns true when `max` moved.
    pub fn grow_max(&mut self, new_max: u64) -> bool {
        if new_max <= self.max {
            return false;
        }
        self.max = new_max;
        self.debug_check_invariant();
        true
    }

    /// Raises the retention floor. Offsets below it are gone, so a lagging
    /// watermark or delivery cursor is dragged up with it.
    pub fn raise_min(&mut self, new_min: u64) -> bool {
        let new_min = new_min.min(self.max);
        if new_min <= self.min {
            return false;
        }
        self.min = new_min;
        self.current = self.current.max(new_min);
        self.next_delivery = self.next_delivery.max(new_min);
        self.debug_check_invariant();
        true
    }

    /// Hands out up to `limit` never-delivered offsets.
    pub(crate) fn take_fresh(&mut self, limit: usize) -> Range<u64> {
        let start = self.next_delivery;
        let end = start.saturating_add(limit as u64).min(self.max);
        self.next_delivery = end;
        self.debug_check_invariant();
        start..end
    }
}
