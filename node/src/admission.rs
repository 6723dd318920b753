// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Client write boundary.
//!
//! Only stateless checks happen here. Preconditions and authorization depend
//! on the leaf current at sequencing time and are left to the mutator.
//!
//! Deletion is checked both before and after the mutation is queued. A
//! deletion that lands in between leaves the mutation in the log, but the
//! write is reported as rejected and a deleted domain is never sequenced, so
//! it can never take effect.

use keyseq_kernel::mutator::check_format;
use keyseq_kernel::types::{DomainId, EntryUpdate, LeafIndex, Sequence};
use std::sync::Arc;

use crate::clock::Clock;
use crate::errors::SequencerError;
use crate::mutation_log::MutationLog;
use crate::registry::DomainRegistry;

pub struct Admission {
    registry: Arc<dyn DomainRegistry>,
    log: Arc<dyn MutationLog>,
    clock: Arc<dyn Clock>,
}

impl Admission {
    pub fn new(registry: Arc<dyn DomainRegistry>, log: Arc<dyn MutationLog>, clock: Arc<dyn Clock>) -> Self {
        Self { registry, log, clock }
    }

    /// Queue a signed mutation and return its sequence number.
    pub async fn submit(
        &self,
        domain_id: &DomainId,
        index: LeafIndex,
        update: EntryUpdate,
    ) -> Result<Sequence, SequencerError> {
        let domain = self.registry.get(domain_id).await?;
        if domain.deleted {
            return Err(SequencerError::DomainDeleted(domain.id));
        }

        check_format(&index, &update).map_err(SequencerError::InvalidMutation)?;

        let sequence = self
            .log
            .send(domain_id, index, update, self.clock.now_ms())
            .await?;

        if self.registry.get(domain_id).await?.deleted {
            tracing::info!(domain = %domain_id, sequence = %sequence, "Domain deleted while admitting mutation");
            return Err(SequencerError::DomainDeleted(domain_id.clone()));
        }

        metrics::counter!("keyseq_mutations_admitted_total", 1);
        tracing::debug!(domain = %domain_id, index = %index, sequence = %sequence, "Mutation admitted");
        Ok(sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::mutation_log::{MemoryMutationLog, MutationLogError, RecordedOutcome};
    use crate::registry::{test_domain, MemoryRegistry};
    use async_trait::async_trait;
    use ed25519_dalek::SigningKey;
    use keyseq_kernel::batch::ConsumedMutation;
    use keyseq_kernel::types::{Entry, QueuedMutation, Revision};

    /// Deletes the domain while the mutation is being queued.
    struct DeletingLog {
        inner: MemoryMutationLog,
        registry: Arc<MemoryRegistry>,
    }

    #[async_trait]
    impl MutationLog for DeletingLog {
        async fn send(
            &self,
            domain: &DomainId,
            index: LeafIndex,
            update: EntryUpdate,
            admitted_at_ms: u64,
        ) -> Result<Sequence, MutationLogError> {
            self.registry.delete(domain).await.unwrap();
            self.inner.send(domain, index, update, admitted_at_ms).await
        }

        async fn read_batch(
            &self,
            domain: &DomainId,
            start_after: Sequence,
            max_count: usize,
        ) -> Result<Vec<QueuedMutation>, MutationLogError> {
            self.inner.read_batch(domain, start_after, max_count).await
        }

        async fn highest_sequence(&self, domain: &DomainId) -> Result<Sequence, MutationLogError> {
            self.inner.highest_sequence(domain).await
        }

        async fn record_outcomes(
            &self,
            domain: &DomainId,
            revision: Revision,
            consumed: &[ConsumedMutation],
        ) -> Result<(), MutationLogError> {
            self.inner.record_outcomes(domain, revision, consumed).await
        }

        async fn missing_outcomes(&self, domain: &DomainId, through: Revision) -> Result<Vec<Revision>, MutationLogError> {
            self.inner.missing_outcomes(domain, through).await
        }

        async fn outcome(
            &self,
            domain: &DomainId,
            sequence: Sequence,
        ) -> Result<Option<RecordedOutcome>, MutationLogError> {
            self.inner.outcome(domain, sequence).await
        }
    }

    fn update(index: LeafIndex) -> EntryUpdate {
        EntryUpdate {
            entry: Entry {
                index,
                commitment: vec![1],
                authorized_keys: vec![SigningKey::from_bytes(&[3u8; 32]).verifying_key().to_bytes()],
                previous: [0u8; 32],
            },
            signatures: vec![vec![0u8; 64]],
        }
    }

    #[tokio::test]
    async fn test_deleted_domain_rejects_writes() {
        let registry = Arc::new(MemoryRegistry::new());
        let domain = test_domain("d1", 1);
        registry.create(domain.clone()).await.unwrap();
        registry.delete(&domain.id).await.unwrap();
        let log = Arc::new(MemoryMutationLog::new());
        let admission = Admission::new(registry, log.clone(), Arc::new(ManualClock::new(0)));

        let index = LeafIndex([1u8; 32]);
        assert!(matches!(
            admission.submit(&domain.id, index, update(index)).await,
            Err(SequencerError::DomainDeleted(_))
        ));
        assert_eq!(log.highest_sequence(&domain.id).await.unwrap(), Sequence::ZERO);
    }

    #[tokio::test]
    async fn test_deletion_during_admission_rejects_write() {
        let registry = Arc::new(MemoryRegistry::new());
        let domain = test_domain("d1", 1);
        registry.create(domain.clone()).await.unwrap();
        let log = Arc::new(DeletingLog {
            inner: MemoryMutationLog::new(),
            registry: registry.clone(),
        });
        let admission = Admission::new(registry.clone(), log, Arc::new(ManualClock::new(0)));

        let index = LeafIndex([1u8; 32]);
        assert!(matches!(
            admission.submit(&domain.id, index, update(index)).await,
            Err(SequencerError::DomainDeleted(_))
        ));
        assert!(registry.get(&domain.id).await.unwrap().deleted);
    }
}
