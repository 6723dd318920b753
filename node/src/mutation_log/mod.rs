// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Mutation Log: the per-domain ordered queue of admitted mutations.
//!
//! Sequence numbers start at 1, are assigned atomically at `send`, and are
//! gapless per domain. A failed `send` assigns nothing.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use keyseq_kernel::batch::{ConsumedMutation, MutationOutcome};
use keyseq_kernel::types::{DomainId, EntryUpdate, LeafIndex, QueuedMutation, Revision, Sequence};
use keyseq_persistence::PersistenceError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub use file::FileMutationLog;
pub use memory::MemoryMutationLog;

#[derive(Error, Debug)]
pub enum MutationLogError {
    #[error("Mutation log unavailable: {0}")]
    Unavailable(String),
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("Corrupt record at sequence {sequence}: {reason}")]
    Corrupt { sequence: u64, reason: String },
    #[error("Invalid domain id for log storage: {0}")]
    InvalidDomain(DomainId),
}

/// Audit record of how a consumed mutation ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedOutcome {
    /// Revision whose batch consumed the mutation.
    pub revision: Revision,
    pub outcome: MutationOutcome,
}

#[async_trait]
pub trait MutationLog: Send + Sync {
    /// Append a mutation and return its sequence number.
    async fn send(
        &self,
        domain: &DomainId,
        index: LeafIndex,
        update: EntryUpdate,
        admitted_at_ms: u64,
    ) -> Result<Sequence, MutationLogError>;

    /// Up to `max_count` mutations with sequence greater than `start_after`,
    /// in sequence order. Repeated calls with the same arguments return the
    /// same mutations.
    async fn read_batch(
        &self,
        domain: &DomainId,
        start_after: Sequence,
        max_count: usize,
    ) -> Result<Vec<QueuedMutation>, MutationLogError>;

    /// Highest assigned sequence, or 0 if nothing was ever admitted.
    async fn highest_sequence(&self, domain: &DomainId) -> Result<Sequence, MutationLogError>;

    /// Remember the terminal outcome of each consumed mutation. Revisions may
    /// be recorded in any order; recording the same revision twice is a no-op.
    /// Heartbeat revisions are recorded with no mutations.
    async fn record_outcomes(
        &self,
        domain: &DomainId,
        revision: Revision,
        consumed: &[ConsumedMutation],
    ) -> Result<(), MutationLogError>;

    /// Revisions in `1..=through` whose outcomes were never recorded.
    async fn missing_outcomes(&self, domain: &DomainId, through: Revision) -> Result<Vec<Revision>, MutationLogError>;

    async fn outcome(
        &self,
        domain: &DomainId,
        sequence: Sequence,
    ) -> Result<Option<RecordedOutcome>, MutationLogError>;
}

/// Up to `max_count` mutations after `start_after` from a sequence-ordered run.
pub(crate) fn batch_after(mutations: &[QueuedMutation], start_after: Sequence, max_count: usize) -> Vec<QueuedMutation> {
    let start = mutations.partition_point(|m| m.sequence <= start_after);
    mutations[start..].iter().take(max_count).cloned().collect()
}

/// Which revisions of a domain have their outcomes recorded.
///
/// Revision 0 consumes nothing and counts as recorded.
#[derive(Debug, Default)]
pub(crate) struct RecordedRevisions {
    /// Every revision up to and including this one is recorded.
    through: Revision,
    /// Recorded revisions past the first gap, with the last sequence each consumed.
    beyond: BTreeMap<Revision, Option<Sequence>>,
    /// Every mutation up to and including this sequence has a recorded outcome.
    settled: Sequence,
}

impl RecordedRevisions {
    pub fn contains(&self, revision: Revision) -> bool {
        revision <= self.through || self.beyond.contains_key(&revision)
    }

    /// Returns false when the revision was already recorded.
    pub fn insert(&mut self, revision: Revision, last_consumed: Option<Sequence>) -> bool {
        if self.contains(revision) {
            return false;
        }
        self.beyond.insert(revision, last_consumed);
        while let Some(last) = self.beyond.remove(&self.through.next()) {
            self.through = self.through.next();
            if let Some(last) = last {
                self.settled = self.settled.max(last);
            }
        }
        true
    }

    pub fn missing(&self, through: Revision) -> Vec<Revision> {
        (self.through.0 + 1..=through.0)
            .map(Revision)
            .filter(|r| !self.beyond.contains_key(r))
            .collect()
    }

    pub fn settled(&self) -> Sequence {
        self.settled
    }
}

/// Everything the volatile backend holds for one domain.
#[derive(Default)]
pub(crate) struct DomainQueue {
    pub mutations: Vec<QueuedMutation>,
    pub outcomes: BTreeMap<Sequence, RecordedOutcome>,
    pub recorded: RecordedRevisions,
}

impl DomainQueue {
    pub fn highest(&self) -> Sequence {
        self.mutations.last().map(|m| m.sequence).unwrap_or(Sequence::ZERO)
    }

    pub fn batch_after(&self, start_after: Sequence, max_count: usize) -> Vec<QueuedMutation> {
        batch_after(&self.mutations, start_after, max_count)
    }

    /// Returns false when the revision was already recorded.
    pub fn apply_outcomes(&mut self, revision: Revision, consumed: &[ConsumedMutation]) -> bool {
        if !self.recorded.insert(revision, consumed.last().map(|c| c.sequence)) {
            return false;
        }
        for c in consumed {
            self.outcomes.insert(
                c.sequence,
                RecordedOutcome {
                    revision,
                    outcome: c.outcome.clone(),
                },
            );
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyseq_kernel::types::Entry;

    fn queued(seq: u64) -> QueuedMutation {
        let index = LeafIndex([1u8; 32]);
        QueuedMutation {
            sequence: Sequence(seq),
            index,
            update: EntryUpdate {
                entry: Entry {
                    index,
                    commitment: vec![seq as u8],
                    authorized_keys: vec![[0u8; 32]],
                    previous: [0u8; 32],
                },
                signatures: vec![],
            },
            admitted_at_ms: 0,
        }
    }

    #[test]
    fn test_batch_after_window() {
        let queue = DomainQueue {
            mutations: (1..=5).map(queued).collect(),
            ..DomainQueue::default()
        };
        let seqs: Vec<u64> = queue.batch_after(Sequence(2), 2).iter().map(|m| m.sequence.0).collect();
        assert_eq!(seqs, vec![3, 4]);
        assert!(queue.batch_after(Sequence(5), 10).is_empty());
        assert_eq!(queue.highest(), Sequence(5));
    }

    #[test]
    fn test_outcomes_recorded_once() {
        let mut queue = DomainQueue::default();
        let consumed = vec![ConsumedMutation {
            sequence: Sequence(1),
            index: LeafIndex([1u8; 32]),
            outcome: MutationOutcome::Accepted,
        }];
        assert!(queue.apply_outcomes(Revision(1), &consumed));
        assert!(!queue.apply_outcomes(Revision(1), &consumed));
        assert_eq!(queue.outcomes[&Sequence(1)].revision, Revision(1));
    }

    #[test]
    fn test_gap_in_recorded_revisions_can_be_filled() {
        let mut recorded = RecordedRevisions::default();
        assert!(recorded.missing(Revision(0)).is_empty());

        // Revision 2 lands while revision 1 is still unrecorded.
        assert!(recorded.insert(Revision(2), Some(Sequence(5))));
        assert!(recorded.insert(Revision(3), None));
        assert_eq!(recorded.missing(Revision(4)), vec![Revision(1), Revision(4)]);
        assert_eq!(recorded.settled(), Sequence::ZERO);

        assert!(recorded.insert(Revision(1), Some(Sequence(2))));
        assert!(!recorded.insert(Revision(2), Some(Sequence(5))));
        assert_eq!(recorded.missing(Revision(4)), vec![Revision(4)]);
        assert_eq!(recorded.settled(), Sequence(5));
        assert!(recorded.contains(Revision(3)));
        assert!(!recorded.contains(Revision(4)));
    }

    #[test]
    fn test_late_revision_outcomes_still_recorded() {
        let mut queue = DomainQueue::default();
        let consumed = |seq: u64| {
            vec![ConsumedMutation {
                sequence: Sequence(seq),
                index: LeafIndex([1u8; 32]),
                outcome: MutationOutcome::Accepted,
            }]
        };
        assert!(queue.apply_outcomes(Revision(2), &consumed(2)));
        assert!(queue.apply_outcomes(Revision(1), &consumed(1)));
        assert_eq!(queue.outcomes[&Sequence(1)].revision, Revision(1));
        assert_eq!(queue.outcomes[&Sequence(2)].revision, Revision(2));
    }
}
