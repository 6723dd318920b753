// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::collections::BTreeMap;

use crate::batch::{plan_revision, touched_indices, MutationOutcome};
use crate::error::{BatchError, Rejection};
use crate::mutator::EntryMutator;
use crate::tests::fixtures::{entry, index, key, queued, sequences};
use crate::types::Sequence;

#[test]
fn test_first_write_creates_leaf() {
    let alice = key(1);
    let v1 = entry(index(1), b"v1", &alice, None);
    let batch = vec![queued(1, v1.clone(), &[&alice])];

    let plan = plan_revision(&EntryMutator, &BTreeMap::new(), &batch, Sequence::ZERO).unwrap();

    assert_eq!(plan.leaves.get(&index(1)), Some(&v1));
    assert_eq!(plan.high_watermark, Sequence(1));
    assert_eq!(plan.accepted(), 1);
    assert_eq!(plan.rejected(), 0);
}

#[test]
fn test_second_update_to_same_index_in_batch_is_stale() {
    let alice = key(1);
    let v1 = entry(index(1), b"v1", &alice, None);
    let v2 = entry(index(1), b"v2", &alice, Some(&v1));
    let v3 = entry(index(1), b"v3", &alice, Some(&v1));

    let mut current = BTreeMap::new();
    current.insert(index(1), v1.clone());
    let batch = vec![queued(2, v2.clone(), &[&alice]), queued(3, v3, &[&alice])];

    let plan = plan_revision(&EntryMutator, &current, &batch, Sequence(1)).unwrap();

    assert_eq!(plan.leaves.get(&index(1)), Some(&v2));
    assert_eq!(plan.consumed[0].outcome, MutationOutcome::Accepted);
    match &plan.consumed[1].outcome {
        MutationOutcome::Rejected(Rejection::StalePrecondition { expected, found }) => {
            assert_eq!(*expected, v2.hash());
            assert_eq!(*found, v1.hash());
        }
        other => panic!("expected stale rejection, got {:?}", other),
    }
    assert_eq!(plan.high_watermark, Sequence(3));
}

#[test]
fn test_chaining_on_in_batch_result_is_stale() {
    // A mutation must reference the leaf as it stood before the batch.
    let alice = key(1);
    let v1 = entry(index(1), b"v1", &alice, None);
    let v2 = entry(index(1), b"v2", &alice, Some(&v1));

    let batch = vec![queued(1, v1, &[&alice]), queued(2, v2, &[&alice])];
    let plan = plan_revision(&EntryMutator, &BTreeMap::new(), &batch, Sequence::ZERO).unwrap();

    assert_eq!(plan.accepted(), 1);
    assert!(matches!(
        plan.consumed[1].outcome,
        MutationOutcome::Rejected(Rejection::StalePrecondition { .. })
    ));
}

#[test]
fn test_rejected_mutations_still_advance_watermark() {
    let alice = key(1);
    let mallory = key(9);
    let v1 = entry(index(1), b"v1", &alice, None);
    let hijack = entry(index(1), b"evil", &mallory, Some(&v1));

    let mut current = BTreeMap::new();
    current.insert(index(1), v1);
    let batch = vec![queued(5, hijack, &[&mallory])];

    let plan = plan_revision(&EntryMutator, &current, &batch, Sequence(4)).unwrap();

    assert!(plan.leaves.is_empty());
    assert_eq!(plan.rejected(), 1);
    assert_eq!(plan.high_watermark, Sequence(5));
}

#[test]
fn test_rejection_does_not_block_later_valid_mutation() {
    // A rejected mutation does not change the leaf, so a later correct
    // mutation to the same index still sees the pre-batch value.
    let alice = key(1);
    let mallory = key(9);
    let v1 = entry(index(1), b"v1", &alice, None);
    let hijack = entry(index(1), b"evil", &mallory, Some(&v1));
    let v2 = entry(index(1), b"v2", &alice, Some(&v1));

    let mut current = BTreeMap::new();
    current.insert(index(1), v1);
    let batch = vec![queued(2, hijack, &[&mallory]), queued(3, v2.clone(), &[&alice])];

    let plan = plan_revision(&EntryMutator, &current, &batch, Sequence(1)).unwrap();
    assert_eq!(plan.leaves.get(&index(1)), Some(&v2));
    assert_eq!(plan.rejected(), 1);
}

#[test]
fn test_independent_indices_all_applied() {
    let alice = key(1);
    let bob = key(2);
    let a = entry(index(1), b"a", &alice, None);
    let b = entry(index(2), b"b", &bob, None);
    let batch = vec![queued(1, a, &[&alice]), queued(2, b, &[&bob])];

    let plan = plan_revision(&EntryMutator, &BTreeMap::new(), &batch, Sequence::ZERO).unwrap();
    assert_eq!(plan.accepted(), 2);
    assert_eq!(touched_indices(&batch).len(), 2);
    assert_eq!(sequences(&batch), vec![1, 2]);
}

#[test]
fn test_gaps_are_tolerated_order_is_not() {
    let alice = key(1);
    let bob = key(2);
    let a = entry(index(1), b"a", &alice, None);
    let b = entry(index(2), b"b", &bob, None);

    let gapped = vec![queued(3, a.clone(), &[&alice]), queued(7, b.clone(), &[&bob])];
    let plan = plan_revision(&EntryMutator, &BTreeMap::new(), &gapped, Sequence::ZERO).unwrap();
    assert_eq!(plan.high_watermark, Sequence(7));

    let reversed = vec![queued(7, b, &[&bob]), queued(3, a, &[&alice])];
    assert_eq!(
        plan_revision(&EntryMutator, &BTreeMap::new(), &reversed, Sequence::ZERO),
        Err(BatchError::OutOfOrder { previous: Sequence(7), found: Sequence(3) })
    );
}

#[test]
fn test_batch_at_or_below_watermark_rejected() {
    let alice = key(1);
    let a = entry(index(1), b"a", &alice, None);
    let batch = vec![queued(4, a, &[&alice])];
    assert!(plan_revision(&EntryMutator, &BTreeMap::new(), &batch, Sequence(4)).is_err());
}

#[test]
fn test_empty_batch_keeps_watermark() {
    let plan = plan_revision(&EntryMutator, &BTreeMap::new(), &[], Sequence(9)).unwrap();
    assert!(plan.leaves.is_empty());
    assert!(plan.consumed.is_empty());
    assert_eq!(plan.high_watermark, Sequence(9));
}
