#[cfg(test)]
use crate::{ack_deadline::AckDeadlineManager, ack_id::AckId, errors::DispatchError};

#[cfg(test)]
use ams_core::names::SubscriptionName;
#[cfg(test)]
use tokio::time::{Duration, Instant};

#[cfg(test)]
fn create_test_manager() -> AckDeadlineManager {
    AckDeadlineManager::new(SubscriptionName::new("ARGO", "sub1"))
}

/// Tests that every lease gets a distinct ack id, even for the same offset,
/// and that leased offsets form the watermark.
#[test]
fn test_lease_issues_unique_ack_ids() {
    let mut manager = create_test_manager();
    let now = Instant::now();

    let first = manager.lease(7, Duration::from_secs(10), now);
    let second = manager.lease(8, Duration::from_secs(10), now);
    assert_ne!(first, second);
    assert_eq!(first.offset(), 7);
    assert_eq!(manager.leased_count(), 2);
    assert_eq!(manager.low_watermark(), Some(7));
    assert_eq!(manager.next_deadline(), Some(now + Duration::from_secs(10)));
}

/// Tests acknowledgement within the deadline:
/// - the offset is returned
/// - the offset leaves the outstanding set
/// - acking the same id twice is rejected as unknown
#[test]
fn test_acknowledge_within_deadline() {
    let mut manager = create_test_manager();
    let now = Instant::now();
    let ack_id = manager.lease(3, Duration::from_secs(10), now);

    // exactly at the deadline still counts
    let acked = manager.acknowledge(&ack_id, now + Duration::from_secs(10));
    assert_eq!(acked.unwrap(), 3);
    assert_eq!(manager.low_watermark(), None);

    let again = manager.acknowledge(&ack_id, now);
    assert!(matches!(again, Err(DispatchError::UnknownAckId(_))));
}

/// Tests the timeout path: ack at t=11 for a 10s lease fails with AckTimeout,
/// the offset stays outstanding and becomes redeliverable, and a retry of the
/// same id keeps failing with AckTimeout.
#[test]
fn test_acknowledge_after_deadline_times_out() {
    let mut manager = create_test_manager();
    let now = Instant::now();
    let ack_id = manager.lease(5, Duration::from_secs(10), now);

    let late = manager.acknowledge(&ack_id, now + Duration::from_secs(11));
    assert!(matches!(late, Err(DispatchError::AckTimeout)));
    assert_eq!(manager.low_watermark(), Some(5));
    assert_eq!(manager.redeliverable(10), vec![5]);
    assert_eq!(manager.leased_count(), 0);

    let retry = manager.acknowledge(&ack_id, now + Duration::from_secs(12));
    assert!(matches!(retry, Err(DispatchError::AckTimeout)));
}

/// Tests the sweep iterator:
/// - only leases past their deadline are produced, oldest deadline first
/// - a partially consumed sweep can be restarted
/// - swept leases answer with AckTimeout afterwards
#[test]
fn test_sweep_expired_is_lazy_and_restartable() {
    let mut manager = create_test_manager();
    let now = Instant::now();
    let a = manager.lease(1, Duration::from_secs(5), now);
    let b = manager.lease(2, Duration::from_secs(3), now);
    let _c = manager.lease(3, Duration::from_secs(30), now);

    let later = now + Duration::from_secs(6);
    let first = manager.sweep_expired(later).next().unwrap();
    assert_eq!(first.ack_id, b);
    assert_eq!(first.offset, 2);

    let rest: Vec<_> = manager.sweep_expired(later).collect();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].ack_id, a);

    assert_eq!(manager.sweep_expired(later).count(), 0);
    assert_eq!(manager.redeliverable(10), vec![1, 2]);
    assert_eq!(manager.leased_count(), 1);
    assert!(matches!(
        manager.acknowledge(&a, later),
        Err(DispatchError::AckTimeout)
    ));
}

/// Tests that a redelivered offset is acked through its new ack id and that
/// the stale id of the earlier attempt becomes unknown once the offset is done.
#[test]
fn test_redelivery_gets_new_ack_id() {
    let mut manager = create_test_manager();
    let now = Instant::now();
    let old = manager.lease(4, Duration::from_secs(1), now);
    let later = now + Duration::from_secs(2);
    assert_eq!(manager.sweep_expired(later).count(), 1);

    let new = manager.lease(4, Duration::from_secs(10), later);
    assert_ne!(old, new);
    assert_eq!(manager.redelivery_count(), 0);

    assert_eq!(manager.acknowledge(&new, later).unwrap(), 4);
    assert!(matches!(
        manager.acknowledge(&old, later),
        Err(DispatchError::UnknownAckId(_))
    ));
}

/// Tests that forged ids (right delivery counter, wrong offset) are rejected.
#[test]
fn test_forged_ack_id_is_unknown() {
    let mut manager = create_test_manager();
    let now = Instant::now();
    let real = manager.lease(9, Duration::from_secs(10), now);
    let forged = AckId::new(&SubscriptionName::new("ARGO", "sub1"), 10, real.delivery());

    assert!(matches!(
        manager.acknowledge(&forged, now),
        Err(DispatchError::UnknownAckId(_))
    ));
    assert_eq!(manager.leased_count(), 1);
}

/// Tests retention cleanup and seek cleanup of in-flight state.
#[test]
fn test_drop_below_and_clear() {
    let mut manager = create_test_manager();
    let now = Instant::now();
    for offset in 0..5 {
        manager.lease(offset, Duration::from_secs(1), now);
    }
    let later = now + Duration::from_secs(2);
    assert_eq!(manager.sweep_expired(later).count(), 5);
    manager.lease(4, Duration::from_secs(10), later);

    manager.drop_below(3);
    assert_eq!(manager.redeliverable(10), vec![3]);
    assert_eq!(manager.low_watermark(), Some(3));

    manager.clear();
    assert_eq!(manager.low_watermark(), None);
    assert_eq!(manager.leased_count(), 0);
    assert_eq!(manager.next_deadline(), None);
}

/// Tests settling an offset without acknowledging it:
/// - live and expired deliveries of the offset are dropped
/// - the offset leaves the redelivery pool and the watermark
/// - a zero deadline lease already in the past does not block it
#[test]
fn test_settle_ignores_deadline() {
    let mut manager = create_test_manager();
    let now = Instant::now();
    let stale = manager.lease(3, Duration::ZERO, now);
    manager.lease(4, Duration::from_secs(10), now);

    let later = now + Duration::from_secs(1);
    assert_eq!(manager.sweep_expired(later).count(), 1);
    assert_eq!(manager.redelivery_count(), 1);
    let fresh = manager.lease(3, Duration::ZERO, later);

    manager.settle(3);
    assert_eq!(manager.leased_count(), 1);
    assert_eq!(manager.redelivery_count(), 0);
    assert_eq!(manager.low_watermark(), Some(4));
    assert!(matches!(
        manager.acknowledge(&stale, later),
        Err(DispatchError::UnknownAckId(_))
    ));
    assert!(matches!(
        manager.acknowledge(&fresh, later),
        Err(DispatchError::UnknownAckId(_))
    ));
}
