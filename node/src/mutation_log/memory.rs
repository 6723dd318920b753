// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use async_trait::async_trait;
use keyseq_kernel::batch::ConsumedMutation;
use keyseq_kernel::types::{DomainId, EntryUpdate, LeafIndex, QueuedMutation, Revision, Sequence};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use super::{DomainQueue, MutationLog, MutationLogError, RecordedOutcome};

/// Volatile mutation log for tests and ephemeral runs. It keeps every
/// mutation and outcome in memory, since memory is its only storage.
#[derive(Default)]
pub struct MemoryMutationLog {
    domains: Mutex<HashMap<DomainId, DomainQueue>>,
    unavailable: AtomicBool,
}

impl MemoryMutationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a backing-store outage: every call fails until cleared.
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), MutationLogError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(MutationLogError::Unavailable("memory log marked unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl MutationLog for MemoryMutationLog {
    async fn send(
        &self,
        domain: &DomainId,
        index: LeafIndex,
        update: EntryUpdate,
        admitted_at_ms: u64,
    ) -> Result<Sequence, MutationLogError> {
        self.check_available()?;
        let mut domains = self.domains.lock().await;
        let queue = domains.entry(domain.clone()).or_default();
        let sequence = queue.highest().next();
        queue.mutations.push(QueuedMutation {
            sequence,
            index,
            update,
            admitted_at_ms,
        });
        Ok(sequence)
    }

    async fn read_batch(
        &self,
        domain: &DomainId,
        start_after: Sequence,
        max_count: usize,
    ) -> Result<Vec<QueuedMutation>, MutationLogError> {
        self.check_available()?;
        let domains = self.domains.lock().await;
        Ok(domains
            .get(domain)
            .map(|q| q.batch_after(start_after, max_count))
            .unwrap_or_default())
    }

    async fn highest_sequence(&self, domain: &DomainId) -> Result<Sequence, MutationLogError> {
        self.check_available()?;
        let domains = self.domains.lock().await;
        Ok(domains.get(domain).map(|q| q.highest()).unwrap_or(Sequence::ZERO))
    }

    async fn record_outcomes(
        &self,
        domain: &DomainId,
        revision: Revision,
        consumed: &[ConsumedMutation],
    ) -> Result<(), MutationLogError> {
        self.check_available()?;
        let mut domains = self.domains.lock().await;
        domains
            .entry(domain.clone())
            .or_default()
            .apply_outcomes(revision, consumed);
        Ok(())
    }

    async fn missing_outcomes(&self, domain: &DomainId, through: Revision) -> Result<Vec<Revision>, MutationLogError> {
        self.check_available()?;
        let domains = self.domains.lock().await;
        Ok(match domains.get(domain) {
            Some(queue) => queue.recorded.missing(through),
            None => (1..=through.0).map(Revision).collect(),
        })
    }

    async fn outcome(
        &self,
        domain: &DomainId,
        sequence: Sequence,
    ) -> Result<Option<RecordedOutcome>, MutationLogError> {
        self.check_available()?;
        let domains = self.domains.lock().await;
        Ok(domains.get(domain).and_then(|q| q.outcomes.get(&sequence).cloned()))
    }
}
