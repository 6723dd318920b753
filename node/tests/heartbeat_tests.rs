// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
mod common;

use common::*;
use keyseq_kernel::types::{Revision, Sequence};
use keyseq_node::anchor::TreeAnchor;
use keyseq_node::config::HeartbeatPolicy;
use keyseq_node::sequencer::RunOutcome;

#[tokio::test]
async fn test_heartbeat_after_max_interval() {
    let h = Harness::with_heartbeat(HeartbeatPolicy::MaxInterval);
    let d1 = h.create_domain_with("d1", 1, 0, 1_000).await;

    assert_eq!(h.sequencer.run_domain(&d1.id).await.unwrap(), RunOutcome::Idle);

    h.clock.advance(999);
    assert_eq!(h.sequencer.run_domain(&d1.id).await.unwrap(), RunOutcome::Idle);

    h.clock.advance(1);
    match h.sequencer.run_domain(&d1.id).await.unwrap() {
        RunOutcome::Committed(report) => {
            assert!(report.heartbeat);
            assert_eq!(report.revision, Revision(1));
            assert_eq!(report.high_watermark, Sequence(0));
            assert_eq!(report.accepted + report.rejected, 0);
        }
        other => panic!("expected heartbeat, got {:?}", other),
    }

    let root = h.latest(&d1).await;
    assert_eq!(root.metadata.timestamp_ms, START_MS + 1_000);
    // Same leaves as revision 0.
    assert_eq!(
        root.root_hash,
        h.anchor.inner().map_root_at(d1.map_tree, Revision(0)).await.unwrap().root_hash
    );

    // The interval restarts from the heartbeat.
    assert_eq!(h.sequencer.run_domain(&d1.id).await.unwrap(), RunOutcome::Idle);
    assert_eq!(h.heads(&d1).await.len(), 2);
}

#[tokio::test]
async fn test_heartbeat_disabled() {
    let h = Harness::with_heartbeat(HeartbeatPolicy::Disabled);
    let d1 = h.create_domain_with("d1", 1, 0, 1_000).await;

    h.clock.advance(60_000);
    assert_eq!(h.sequencer.run_domain(&d1.id).await.unwrap(), RunOutcome::Idle);
    assert_eq!(h.latest(&d1).await.revision, Revision(0));
}

#[tokio::test]
async fn test_min_interval_defers_revision() {
    let h = Harness::new();
    let d1 = h.create_domain_with("d1", 1, 500, 60_000).await;
    let owner = key(10);
    h.submit("d1", signed(first_write(index(1), b"v1", &owner), &owner)).await;

    assert_eq!(h.sequencer.run_domain(&d1.id).await.unwrap(), RunOutcome::NotDue);

    h.clock.advance(499);
    assert_eq!(h.sequencer.run_domain(&d1.id).await.unwrap(), RunOutcome::NotDue);
    assert_eq!(h.latest(&d1).await.revision, Revision(0));

    h.clock.advance(1);
    assert!(matches!(
        h.sequencer.run_domain(&d1.id).await.unwrap(),
        RunOutcome::Committed(_)
    ));
}

#[tokio::test]
async fn test_pending_mutations_never_wait_for_max_interval() {
    let h = Harness::with_heartbeat(HeartbeatPolicy::Disabled);
    let d1 = h.create_domain_with("d1", 1, 0, 1_000_000).await;
    let owner = key(10);
    h.submit("d1", signed(first_write(index(1), b"v1", &owner), &owner)).await;

    match h.sequencer.run_domain(&d1.id).await.unwrap() {
        RunOutcome::Committed(report) => assert!(!report.heartbeat),
        other => panic!("expected commit, got {:?}", other),
    }
}
