// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Batch planning: the pure half of the sequencer.
//!
//! Given the leaves as they stood at revision R and the next batch from the
//! mutation log, decide the leaf set of revision R+1.
//!
//! # Rules
//! - Mutations are applied in sequence order
//! - Every precondition is checked against the pre-batch leaf
//! - At most one mutation per index is accepted per batch; any later mutation
//!   to that index is stale, since the leaf it references has been superseded
//! - Rejected mutations are consumed: they advance the watermark

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::error::{BatchError, Rejection};
use crate::hash::previous_hash;
use crate::mutator::Mutator;
use crate::types::{Entry, LeafIndex, QueuedMutation, Revision, Sequence};

/// Terminal outcome of one consumed mutation, kept for audit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationOutcome {
    Accepted,
    Rejected(Rejection),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumedMutation {
    pub sequence: Sequence,
    pub index: LeafIndex,
    pub outcome: MutationOutcome,
}

/// Outcomes of every mutation a revision consumed. Empty for a heartbeat.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeBatch {
    pub revision: Revision,
    pub consumed: Vec<ConsumedMutation>,
}

/// Everything the sequencer needs to commit the next revision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevisionPlan {
    /// New values for every index changed in this batch.
    pub leaves: BTreeMap<LeafIndex, Entry>,
    /// One record per mutation in the batch, in sequence order.
    pub consumed: Vec<ConsumedMutation>,
    /// Sequence of the last mutation in the batch; the watermark after commit.
    pub high_watermark: Sequence,
}

impl RevisionPlan {
    pub fn accepted(&self) -> usize {
        self.leaves.len()
    }

    pub fn rejected(&self) -> usize {
        self.consumed.len() - self.leaves.len()
    }
}

/// Distinct indices touched by a batch: the leaves to fetch before planning.
pub fn touched_indices(batch: &[QueuedMutation]) -> BTreeSet<LeafIndex> {
    batch.iter().map(|m| m.index).collect()
}

/// Plan the revision that incorporates `batch`.
///
/// `current` must hold the pre-batch value of every index in the batch that
/// has one; an absent key means the index has never been written.
/// `watermark` is the current watermark, returned unchanged for an empty batch.
pub fn plan_revision<M: Mutator + ?Sized>(
    mutator: &M,
    current: &BTreeMap<LeafIndex, Entry>,
    batch: &[QueuedMutation],
    watermark: Sequence,
) -> Result<RevisionPlan, BatchError> {
    let mut leaves: BTreeMap<LeafIndex, Entry> = BTreeMap::new();
    let mut consumed = Vec::with_capacity(batch.len());
    let mut last = watermark;

    for mutation in batch {
        if mutation.sequence <= last {
            return Err(BatchError::OutOfOrder {
                previous: last,
                found: mutation.sequence,
            });
        }
        last = mutation.sequence;

        let outcome = match leaves.get(&mutation.index) {
            // Already changed in this batch. Whatever this mutation
            // references, it cannot be the leaf that will be current.
            Some(accepted) => MutationOutcome::Rejected(Rejection::StalePrecondition {
                expected: previous_hash(Some(accepted)),
                found: mutation.update.entry.previous,
            }),
            None => match mutator.mutate(current.get(&mutation.index), mutation) {
                Ok(entry) => {
                    leaves.insert(mutation.index, entry);
                    MutationOutcome::Accepted
                }
                Err(rejection) => MutationOutcome::Rejected(rejection),
            },
        };

        consumed.push(ConsumedMutation {
            sequence: mutation.sequence,
            index: mutation.index,
            outcome,
        });
    }

    Ok(RevisionPlan {
        leaves,
        consumed,
        high_watermark: last,
    })
}
