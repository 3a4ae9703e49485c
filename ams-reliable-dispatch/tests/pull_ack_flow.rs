//! Pull / acknowledge flow through the DispatchEngine

use ams_core::names::SubscriptionName;
use ams_reliable_dispatch::error_message::ApiError;
use ams_reliable_dispatch::{DispatchError, Offsets};
use anyhow::Result;
use std::collections::HashSet;
use tokio::time::{advance, timeout, Duration};

mod common;
use common::*;

/// Test: Acks advance current offset
///
/// Purpose
/// - Validate that acknowledging every delivered message moves the watermark to the tail.
///
/// Flow
/// - Publish 5 messages, pull them in two batches, acknowledge out of order.
///
/// Expected
/// - currentOffset only advances past contiguous acknowledged offsets.
/// - After the last ack, currentOffset == maxOffset.
#[tokio::test]
async fn acks_advance_current_offset() -> Result<()> {
    let (engine, log) = setup_engine();
    let (topic, sub) = create_topic_and_subscription(&engine, "topic1", "sub1").await?;
    publish(&engine, &log, &topic, 5).await?;

    let first = engine.pull(&sub, 3, true).await?;
    let second = engine.pull(&sub, 3, true).await?;
    assert_eq!(offsets_of(&first), vec![0, 1, 2]);
    assert_eq!(offsets_of(&second), vec![3, 4]);

    engine.acknowledge(&sub, &ack_ids_of(&second)).await?.into_result()?;
    assert_eq!(engine.get_offsets(&sub).await?.current, 0);

    engine.acknowledge(&sub, &[first[0].ack_id.as_str()]).await?.into_result()?;
    assert_eq!(engine.get_offsets(&sub).await?.current, 1);

    engine.acknowledge(&sub, &ack_ids_of(&first[1..])).await?.into_result()?;
    assert_eq!(
        engine.get_offsets(&sub).await?,
        Offsets {
            max: 5,
            min: 0,
            current: 5
        }
    );

    let metrics = engine.metrics(&sub).await?;
    assert_eq!(metrics.messages, 5);
    assert!(metrics.latest_consume.is_some());
    Ok(())
}

/// Test: Ack after deadline times out and redelivers
///
/// Purpose
/// - Validate the ack deadline: a late ack fails with 408 and the message is redelivered.
///
/// Flow
/// - Publish 1 message, pull it, let 11s pass (deadline is 10s), acknowledge.
/// - Pull again and acknowledge the redelivery in time.
///
/// Expected
/// - The late ack reports AckTimeout with the exact error payload; offsets are unchanged.
/// - The redelivery carries the same message under a new ack id; acking it advances the offset.
#[tokio::test(start_paused = true)]
async fn ack_after_deadline_times_out_and_redelivers() -> Result<()> {
    let (engine, log) = setup_engine();
    let (topic, sub) = create_topic_and_subscription(&engine, "topic1", "sub1").await?;
    publish(&engine, &log, &topic, 1).await?;

    let delivered = engine.pull(&sub, 1, true).await?;
    assert_eq!(delivered.len(), 1);
    let before = engine.get_offsets(&sub).await?;

    advance(Duration::from_secs(11)).await;
    let report = engine.acknowledge(&sub, &ack_ids_of(&delivered)).await?;
    assert!(!report.is_success());
    let (_, err) = &report.failed[0];
    assert!(matches!(err, DispatchError::AckTimeout));
    assert_eq!(
        ApiError::from(err).to_json(),
        r#"{"error":{"code":408,"message":"ack timeout","status":"TIMEOUT"}}"#
    );
    assert_eq!(engine.get_offsets(&sub).await?, before);

    // the stale id stays timed out
    let again = engine.acknowledge(&sub, &ack_ids_of(&delivered)).await?;
    assert!(matches!(again.failed[0].1, DispatchError::AckTimeout));

    let redelivered = engine.pull(&sub, 1, true).await?;
    assert_eq!(redelivered.len(), 1);
    assert_eq!(redelivered[0].message, delivered[0].message);
    assert_ne!(redelivered[0].ack_id, delivered[0].ack_id);

    engine.acknowledge(&sub, &ack_ids_of(&redelivered)).await?.into_result()?;
    assert_eq!(engine.get_offsets(&sub).await?.current, 1);
    Ok(())
}

/// Test: Concurrent pulls deliver once
///
/// Purpose
/// - Validate exclusivity of a lease between concurrent pulls.
///
/// Flow
/// - Publish 1 message, run two single-message pulls concurrently.
///
/// Expected
/// - Exactly one pull receives the message.
#[tokio::test]
async fn concurrent_pulls_deliver_once() -> Result<()> {
    let (engine, log) = setup_engine();
    let (topic, sub) = create_topic_and_subscription(&engine, "topic1", "sub1").await?;
    publish(&engine, &log, &topic, 1).await?;

    let pulls = (0..2).map(|_| {
        let engine = engine.clone();
        let sub = sub.clone();
        tokio::spawn(async move { engine.pull(&sub, 1, true).await })
    });
    let mut delivered = Vec::new();
    for handle in pulls.collect::<Vec<_>>() {
        delivered.extend(handle.await??);
    }

    assert_eq!(offsets_of(&delivered), vec![0]);
    Ok(())
}

/// Test: Blocking pull released by append listener
///
/// Purpose
/// - Validate that a blocking pull is released by the log's append notifications.
///
/// Flow
/// - Start the append listener, start a blocking pull on an empty subscription,
///   then append a message directly to the log.
///
/// Expected
/// - The pull returns the appended message well before the pull timeout.
#[tokio::test]
async fn blocking_pull_released_by_append_listener() -> Result<()> {
    let (engine, log) = setup_engine();
    let (topic, sub) = create_topic_and_subscription(&engine, "topic1", "sub1").await?;
    let listener = engine.spawn_append_listener(topic.clone())?;

    let waiter = {
        let engine = engine.clone();
        let sub = sub.clone();
        tokio::spawn(async move { engine.pull(&sub, 10, false).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    log.append(&topic, "aGVsbG8", Default::default());

    let received = timeout(Duration::from_secs(5), waiter).await???;
    assert_eq!(offsets_of(&received), vec![0]);
    assert_eq!(engine.get_offsets(&sub).await?.max, 1);

    listener.abort();
    Ok(())
}

/// Test: Bad ack ids fail individually
///
/// Purpose
/// - Validate per-id handling of malformed, foreign and unknown ack ids.
///
/// Flow
/// - Deliver 2 messages, acknowledge a batch mixing one valid id with bad ones.
///
/// Expected
/// - The valid id is acknowledged, each bad id reports its own error.
#[tokio::test]
async fn bad_ack_ids_fail_individually() -> Result<()> {
    let (engine, log) = setup_engine();
    let (topic, sub) = create_topic_and_subscription(&engine, "topic1", "sub1").await?;
    publish(&engine, &log, &topic, 2).await?;
    let delivered = engine.pull(&sub, 2, true).await?;

    let foreign = delivered[1].ack_id.replace("sub1", "sub2");
    let unknown = "projects/ARGO/subscriptions/sub1:1:999".to_string();
    let batch = vec![
        delivered[0].ack_id.clone(),
        "garbage".to_string(),
        foreign.clone(),
        unknown.clone(),
    ];
    let report = engine.acknowledge(&sub, &batch).await?;

    assert_eq!(report.acknowledged, vec![delivered[0].ack_id.clone()]);
    let failed: HashSet<&str> = report.failed.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(failed, HashSet::from(["garbage", foreign.as_str(), unknown.as_str()]));
    assert!(matches!(report.failed[0].1, DispatchError::InvalidAckId(_)));
    assert!(matches!(report.failed[1].1, DispatchError::InvalidAckId(_)));
    assert!(matches!(report.failed[2].1, DispatchError::UnknownAckId(_)));
    assert_eq!(ApiError::from(&report.failed[2].1).code(), 400);

    assert_eq!(engine.get_offsets(&sub).await?.current, 1);

    let missing = SubscriptionName::new(PROJECT, "missing");
    assert!(matches!(
        engine.acknowledge(&missing, &batch).await,
        Err(DispatchError::SubscriptionNotFound(_))
    ));
    Ok(())
}
