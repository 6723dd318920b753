// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Sequencer: turns a domain's pending mutations into the next map revision.
//!
//! One run, one domain, at most one revision:
//! 1. Read the latest map root (revision R, watermark W)
//! 2. Re-append any heads the log is missing
//! 3. Replay committed revisions whose outcomes were never recorded
//! 4. Skip if R is younger than the domain's min interval
//! 5. Read the batch after W; an empty batch may produce a heartbeat
//! 6. Plan R+1 with the mutator
//! 7. Write leaves + `{watermark, timestamp}` as R+1 (CAS)
//! 8. Sign the head and append it to the log
//! 9. Record outcomes
//!
//! The watermark only moves inside step 7, so abandoning a run at any point
//! leaves either the old (R, W) or the new (R+1, W') pair. Outcomes lost
//! after step 7 are rebuilt by step 3 of a later run.

use ed25519_dalek::SigningKey;
use keyseq_kernel::batch::{plan_revision, touched_indices, ConsumedMutation, MutationOutcome};
use keyseq_kernel::head::{MapHead, RevisionMetadata, SignedMapHead};
use keyseq_kernel::mutator::Mutator;
use keyseq_kernel::types::{DomainId, Entry, LeafIndex, Revision, Sequence};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::anchor::{MapRoot, TreeAnchor};
use crate::clock::Clock;
use crate::config::{HeartbeatPolicy, SequencerConfig};
use crate::errors::SequencerError;
use crate::mutation_log::MutationLog;
use crate::recovery::reconcile_heads;
use crate::registry::{Domain, DomainRegistry};

/// Sign the head for a committed map root.
pub fn sign_head(domain: &Domain, root: &MapRoot, key: &SigningKey) -> SignedMapHead {
    let head = MapHead {
        domain_id: domain.id.clone(),
        map_tree: domain.map_tree,
        revision: root.revision,
        root_hash: root.root_hash,
        metadata: root.metadata,
    };
    SignedMapHead::sign(head, key)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevisionReport {
    pub revision: Revision,
    pub high_watermark: Sequence,
    pub accepted: usize,
    pub rejected: usize,
    /// Empty revision created by the heartbeat policy.
    pub heartbeat: bool,
    /// The head could not be appended; the next run re-appends it.
    pub head_pending: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Committed(RevisionReport),
    /// Nothing pending and no heartbeat due.
    Idle,
    /// The latest revision is younger than the domain's min interval.
    NotDue,
}

pub struct Sequencer {
    registry: Arc<dyn DomainRegistry>,
    log: Arc<dyn MutationLog>,
    anchor: Arc<dyn TreeAnchor>,
    mutator: Arc<dyn Mutator>,
    clock: Arc<dyn Clock>,
    batch_size: usize,
    heartbeat: HeartbeatPolicy,
    locks: Mutex<HashMap<DomainId, Arc<tokio::sync::Mutex<()>>>>,
}

impl Sequencer {
    pub fn new(
        registry: Arc<dyn DomainRegistry>,
        log: Arc<dyn MutationLog>,
        anchor: Arc<dyn TreeAnchor>,
        mutator: Arc<dyn Mutator>,
        clock: Arc<dyn Clock>,
        config: &SequencerConfig,
    ) -> Self {
        Self {
            registry,
            log,
            anchor,
            mutator,
            clock,
            batch_size: config.batch_size,
            heartbeat: config.heartbeat,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn domain_lock(&self, id: &DomainId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(id.clone()).or_default().clone()
    }

    /// Run the sequencer once for one domain.
    pub async fn run_domain(&self, id: &DomainId) -> Result<RunOutcome, SequencerError> {
        if self.registry.get(id).await?.deleted {
            return Err(SequencerError::DomainDeleted(id.clone()));
        }

        let lock = self.domain_lock(id);
        let _guard = lock.lock().await;

        // Deletion may have landed while waiting for the lock.
        let domain = self.registry.get(id).await?;
        if domain.deleted {
            return Err(SequencerError::DomainDeleted(domain.id));
        }

        let start = Instant::now();
        let outcome = self.run_locked(&domain).await;
        metrics::histogram!("keyseq_batch_duration_seconds", start.elapsed().as_secs_f64());
        outcome
    }

    async fn run_locked(&self, domain: &Domain) -> Result<RunOutcome, SequencerError> {
        let current = self
            .anchor
            .latest_map_root(domain.map_tree)
            .await?
            .ok_or_else(|| {
                SequencerError::Inconsistent(format!("domain {} has no revision 0", domain.id))
            })?;

        reconcile_heads(self.anchor.as_ref(), domain, &current).await?;
        self.repair_outcomes(domain, &current).await?;

        let now = self.clock.now_ms();
        let elapsed = now.saturating_sub(current.metadata.timestamp_ms);
        if elapsed < domain.min_interval_ms {
            tracing::trace!(domain = %domain.id, elapsed, "Revision not due");
            return Ok(RunOutcome::NotDue);
        }

        let watermark = current.metadata.high_watermark;
        let batch = self
            .log
            .read_batch(&domain.id, watermark, self.batch_size)
            .await?;

        if batch.is_empty() {
            let due = self.heartbeat == HeartbeatPolicy::MaxInterval && elapsed >= domain.max_interval_ms;
            if !due {
                return Ok(RunOutcome::Idle);
            }
            let metadata = RevisionMetadata {
                high_watermark: watermark,
                timestamp_ms: now,
            };
            let (root, head_pending) = self.commit(domain, &current, BTreeMap::new(), metadata).await?;
            self.record_outcomes(domain, root.revision, &[]).await;
            tracing::info!(domain = %domain.id, revision = %root.revision, "Heartbeat revision committed");
            return Ok(RunOutcome::Committed(RevisionReport {
                revision: root.revision,
                high_watermark: watermark,
                accepted: 0,
                rejected: 0,
                heartbeat: true,
                head_pending,
            }));
        }

        let indices: Vec<_> = touched_indices(&batch).into_iter().collect();
        let leaves = self
            .anchor
            .get_leaves(domain.map_tree, current.revision, &indices)
            .await?;

        let plan = plan_revision(self.mutator.as_ref(), &leaves, &batch, watermark)
            .map_err(|e| SequencerError::Inconsistent(format!("domain {}: {}", domain.id, e)))?;

        for consumed in &plan.consumed {
            if let MutationOutcome::Rejected(rejection) = &consumed.outcome {
                tracing::debug!(
                    domain = %domain.id,
                    sequence = %consumed.sequence,
                    reason = %rejection,
                    "Mutation rejected"
                );
                metrics::counter!("keyseq_mutations_rejected_total", 1, "reason" => rejection.kind());
            }
        }

        let metadata = RevisionMetadata {
            high_watermark: plan.high_watermark,
            timestamp_ms: now,
        };
        let accepted = plan.accepted();
        let rejected = plan.rejected();
        let (root, head_pending) = self.commit(domain, &current, plan.leaves, metadata).await?;

        self.record_outcomes(domain, root.revision, &plan.consumed).await;

        tracing::info!(
            domain = %domain.id,
            revision = %root.revision,
            watermark = %plan.high_watermark,
            accepted,
            rejected,
            "Revision committed"
        );

        Ok(RunOutcome::Committed(RevisionReport {
            revision: root.revision,
            high_watermark: plan.high_watermark,
            accepted,
            rejected,
            heartbeat: false,
            head_pending,
        }))
    }

    /// A failure leaves the revision unrecorded; a later run replays it.
    async fn record_outcomes(&self, domain: &Domain, revision: Revision, consumed: &[ConsumedMutation]) {
        if let Err(e) = self.log.record_outcomes(&domain.id, revision, consumed).await {
            tracing::warn!(domain = %domain.id, revision = %revision, error = %e, "Failed to record outcomes");
        }
    }

    /// Record outcomes for every committed revision that is missing them.
    async fn repair_outcomes(&self, domain: &Domain, current: &MapRoot) -> Result<usize, SequencerError> {
        let missing = self.log.missing_outcomes(&domain.id, current.revision).await?;
        for revision in &missing {
            let consumed = self.replay_revision(domain, *revision).await?;
            self.log.record_outcomes(&domain.id, *revision, &consumed).await?;
            tracing::warn!(
                domain = %domain.id,
                revision = %revision,
                mutations = consumed.len(),
                "Recorded outcomes of committed revision"
            );
            metrics::counter!("keyseq_outcomes_repaired_total", 1);
        }
        Ok(missing.len())
    }

    /// Re-derive the outcomes of a committed revision by planning its batch
    /// again against the leaves of the revision before it.
    async fn replay_revision(&self, domain: &Domain, revision: Revision) -> Result<Vec<ConsumedMutation>, SequencerError> {
        let previous = revision.0.checked_sub(1).map(Revision).ok_or_else(|| {
            SequencerError::Inconsistent(format!("domain {}: revision 0 has no batch", domain.id))
        })?;
        let before = self.anchor.map_root_at(domain.map_tree, previous).await?;
        let after = self.anchor.map_root_at(domain.map_tree, revision).await?;
        let (from, to) = (before.metadata.high_watermark, after.metadata.high_watermark);
        if to <= from {
            return Ok(Vec::new());
        }

        let span = usize::try_from(to.0 - from.0).unwrap_or(usize::MAX);
        let batch: Vec<_> = self
            .log
            .read_batch(&domain.id, from, span)
            .await?
            .into_iter()
            .take_while(|m| m.sequence <= to)
            .collect();
        if batch.last().map(|m| m.sequence) != Some(to) {
            return Err(SequencerError::Inconsistent(format!(
                "domain {}: mutation log ends before the watermark {} of revision {}",
                domain.id, to, revision
            )));
        }

        let indices: Vec<_> = touched_indices(&batch).into_iter().collect();
        let leaves = self.anchor.get_leaves(domain.map_tree, previous, &indices).await?;
        let plan = plan_revision(self.mutator.as_ref(), &leaves, &batch, from)
            .map_err(|e| SequencerError::Inconsistent(format!("domain {}: {}", domain.id, e)))?;

        let stored = self.anchor.get_leaves(domain.map_tree, revision, &indices).await?;
        let diverged = plan.high_watermark != to
            || plan.leaves.iter().any(|(index, entry)| stored.get(index) != Some(entry));
        if diverged {
            return Err(SequencerError::Inconsistent(format!(
                "domain {}: replaying revision {} does not reproduce its leaves",
                domain.id, revision
            )));
        }
        Ok(plan.consumed)
    }

    /// Write the next revision and append its head. Returns the new root and
    /// whether the head append is still outstanding.
    async fn commit(
        &self,
        domain: &Domain,
        current: &MapRoot,
        leaves: BTreeMap<LeafIndex, Entry>,
        metadata: RevisionMetadata,
    ) -> Result<(MapRoot, bool), SequencerError> {
        let root = self
            .anchor
            .write_map_leaves(domain.map_tree, current.revision.next(), leaves, metadata)
            .await?;
        metrics::counter!("keyseq_revisions_committed_total", 1);

        let head = sign_head(domain, &root, &domain.signing_key());
        let head_pending = match self.anchor.append_log_entry(domain.log_tree, head).await {
            Ok(_) => false,
            Err(e) => {
                tracing::warn!(
                    domain = %domain.id,
                    revision = %root.revision,
                    error = %e,
                    "Head append failed; will reconcile on next run"
                );
                true
            }
        };
        Ok((root, head_pending))
    }
}
