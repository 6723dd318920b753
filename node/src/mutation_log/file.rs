// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Durable mutation log: one record file per domain.
//!
//! `<dir>/<domain>.log` holds the queued mutations, frame sequence = mutation
//! sequence. `<dir>/<domain>.outcomes` holds one [`OutcomeBatch`] frame per
//! recorded revision, in recording order.
//!
//! Memory per domain stays proportional to the unsettled backlog: mutations
//! whose outcomes are recorded are dropped from the cache and read back from
//! disk by offset. Outcome lookups always go to disk.

use async_trait::async_trait;
use keyseq_kernel::batch::{ConsumedMutation, OutcomeBatch};
use keyseq_kernel::types::{DomainId, EntryUpdate, LeafIndex, QueuedMutation, Revision, Sequence};
use keyseq_persistence::LogFile;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::{batch_after, MutationLog, MutationLogError, RecordedOutcome, RecordedRevisions};

struct DomainFiles {
    mutations: LogFile,
    outcomes: LogFile,
    highest: Sequence,
    /// Frame offset of every mutation; entry `i` holds sequence `i + 1`.
    offsets: Vec<u64>,
    /// Mutations past the settled sequence, in sequence order.
    unsettled: Vec<QueuedMutation>,
    recorded: RecordedRevisions,
    /// Outcome frame offsets keyed by the last sequence the revision consumed.
    outcome_frames: BTreeMap<Sequence, u64>,
}

impl DomainFiles {
    fn read_mutation(&self, sequence: Sequence) -> Result<QueuedMutation, MutationLogError> {
        let offset = sequence
            .0
            .checked_sub(1)
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| self.offsets.get(i))
            .ok_or_else(|| MutationLogError::Corrupt {
                sequence: sequence.0,
                reason: "no frame recorded for sequence".into(),
            })?;
        let frame = self.mutations.read_at(*offset)?;
        let mutation: QueuedMutation = decode(frame.sequence, &frame.payload)?;
        if mutation.sequence != sequence {
            return Err(MutationLogError::Corrupt {
                sequence: sequence.0,
                reason: format!("frame holds sequence {}", mutation.sequence),
            });
        }
        Ok(mutation)
    }

    fn batch_after(&self, start_after: Sequence, max_count: usize) -> Result<Vec<QueuedMutation>, MutationLogError> {
        let first_cached = self
            .unsettled
            .first()
            .map(|m| m.sequence)
            .unwrap_or_else(|| self.highest.next());

        let mut batch = Vec::new();
        let mut next = start_after.next();
        while next < first_cached && batch.len() < max_count {
            batch.push(self.read_mutation(next)?);
            next = next.next();
        }
        let remaining = max_count - batch.len();
        batch.extend(batch_after(&self.unsettled, start_after, remaining));
        Ok(batch)
    }

    fn outcome(&self, sequence: Sequence) -> Result<Option<RecordedOutcome>, MutationLogError> {
        let Some((_, offset)) = self.outcome_frames.range(sequence..).next() else {
            return Ok(None);
        };
        let frame = self.outcomes.read_at(*offset)?;
        let batch: OutcomeBatch = decode(frame.sequence, &frame.payload)?;
        Ok(batch
            .consumed
            .into_iter()
            .find(|c| c.sequence == sequence)
            .map(|c| RecordedOutcome {
                revision: batch.revision,
                outcome: c.outcome,
            }))
    }

    fn note_outcomes(&mut self, revision: Revision, consumed: &[ConsumedMutation], offset: u64) -> bool {
        let last = consumed.last().map(|c| c.sequence);
        if !self.recorded.insert(revision, last) {
            return false;
        }
        if let Some(last) = last {
            self.outcome_frames.insert(last, offset);
        }
        true
    }

    /// Drop cached mutations that every reader can now get from disk.
    fn evict_settled(&mut self) {
        let settled = self.recorded.settled();
        let cut = self.unsettled.partition_point(|m| m.sequence <= settled);
        if cut > 0 {
            self.unsettled.drain(..cut);
        }
    }
}

pub struct FileMutationLog {
    dir: PathBuf,
    domains: Mutex<HashMap<DomainId, DomainFiles>>,
}

/// Domain ids become file names, so they are restricted to a safe alphabet.
pub fn is_storable_domain_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && !id.starts_with('.')
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, MutationLogError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| MutationLogError::Unavailable(format!("encode failed: {}", e)))
}

fn decode<T: serde::de::DeserializeOwned>(sequence: u64, bytes: &[u8]) -> Result<T, MutationLogError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| MutationLogError::Corrupt {
            sequence,
            reason: e.to_string(),
        })?;
    Ok(value)
}

impl FileMutationLog {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, MutationLogError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(keyseq_persistence::PersistenceError::from)?;
        Ok(Self {
            dir,
            domains: Mutex::new(HashMap::new()),
        })
    }

    fn load(&self, domain: &DomainId) -> Result<DomainFiles, MutationLogError> {
        if !is_storable_domain_id(domain.as_str()) {
            return Err(MutationLogError::InvalidDomain(domain.clone()));
        }

        let (outcomes, outcome_frames) = LogFile::open(self.dir.join(format!("{}.outcomes", domain)))?;
        let (mutations, mutation_frames) = LogFile::open(self.dir.join(format!("{}.log", domain)))?;
        let mut files = DomainFiles {
            mutations,
            outcomes,
            highest: Sequence::ZERO,
            offsets: Vec::with_capacity(mutation_frames.len()),
            unsettled: Vec::new(),
            recorded: RecordedRevisions::default(),
            outcome_frames: BTreeMap::new(),
        };

        for frame in outcome_frames {
            let batch: OutcomeBatch = decode(frame.sequence, &frame.payload)?;
            files.note_outcomes(batch.revision, &batch.consumed, frame.offset);
        }

        let settled = files.recorded.settled();
        for frame in mutation_frames {
            let mutation: QueuedMutation = decode(frame.sequence, &frame.payload)?;
            if mutation.sequence.0 != frame.sequence {
                return Err(MutationLogError::Corrupt {
                    sequence: frame.sequence,
                    reason: format!("payload claims sequence {}", mutation.sequence),
                });
            }
            if mutation.sequence != files.highest.next() {
                return Err(MutationLogError::Corrupt {
                    sequence: frame.sequence,
                    reason: format!("gap after sequence {}", files.highest),
                });
            }
            files.highest = mutation.sequence;
            files.offsets.push(frame.offset);
            if mutation.sequence > settled {
                files.unsettled.push(mutation);
            }
        }

        tracing::debug!(
            domain = %domain,
            mutations = files.offsets.len(),
            unsettled = files.unsettled.len(),
            "Opened mutation log"
        );

        Ok(files)
    }

    async fn with_domain<T>(
        &self,
        domain: &DomainId,
        f: impl FnOnce(&mut DomainFiles) -> Result<T, MutationLogError>,
    ) -> Result<T, MutationLogError> {
        let mut domains = self.domains.lock().await;
        if !domains.contains_key(domain) {
            let files = self.load(domain)?;
            domains.insert(domain.clone(), files);
        }
        match domains.get_mut(domain) {
            Some(files) => f(files),
            None => Err(MutationLogError::Unavailable(format!("log for {} not loaded", domain))),
        }
    }

    /// Mutations currently cached for a domain.
    pub async fn cached_mutations(&self, domain: &DomainId) -> Result<usize, MutationLogError> {
        self.with_domain(domain, |files| Ok(files.unsettled.len())).await
    }
}

#[async_trait]
impl MutationLog for FileMutationLog {
    async fn send(
        &self,
        domain: &DomainId,
        index: LeafIndex,
        update: EntryUpdate,
        admitted_at_ms: u64,
    ) -> Result<Sequence, MutationLogError> {
        self.with_domain(domain, |files| {
            let mutation = QueuedMutation {
                sequence: files.highest.next(),
                index,
                update,
                admitted_at_ms,
            };
            let payload = encode(&mutation)?;
            let offset = files.mutations.append(mutation.sequence.0, &payload)?;
            let sequence = mutation.sequence;
            files.highest = sequence;
            files.offsets.push(offset);
            files.unsettled.push(mutation);
            Ok(sequence)
        })
        .await
    }

    async fn read_batch(
        &self,
        domain: &DomainId,
        start_after: Sequence,
        max_count: usize,
    ) -> Result<Vec<QueuedMutation>, MutationLogError> {
        self.with_domain(domain, |files| files.batch_after(start_after, max_count))
            .await
    }

    async fn highest_sequence(&self, domain: &DomainId) -> Result<Sequence, MutationLogError> {
        self.with_domain(domain, |files| Ok(files.highest)).await
    }

    async fn record_outcomes(
        &self,
        domain: &DomainId,
        revision: Revision,
        consumed: &[ConsumedMutation],
    ) -> Result<(), MutationLogError> {
        self.with_domain(domain, |files| {
            if files.recorded.contains(revision) {
                return Ok(());
            }
            let payload = encode(&OutcomeBatch {
                revision,
                consumed: consumed.to_vec(),
            })?;
            let next = files.outcomes.last_sequence() + 1;
            let offset = files.outcomes.append(next, &payload)?;
            files.note_outcomes(revision, consumed, offset);
            files.evict_settled();
            Ok(())
        })
        .await
    }

    async fn missing_outcomes(&self, domain: &DomainId, through: Revision) -> Result<Vec<Revision>, MutationLogError> {
        self.with_domain(domain, |files| Ok(files.recorded.missing(through))).await
    }

    async fn outcome(
        &self,
        domain: &DomainId,
        sequence: Sequence,
    ) -> Result<Option<RecordedOutcome>, MutationLogError> {
        self.with_domain(domain, |files| files.outcome(sequence)).await
    }
}
