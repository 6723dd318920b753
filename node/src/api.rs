// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! HTTP request and response bodies. Binary fields travel as hex.

use keyseq_kernel::batch::MutationOutcome;
use keyseq_kernel::head::SignedMapHead;
use keyseq_kernel::types::{Entry, EntryUpdate, LeafIndex};
use serde::{Deserialize, Serialize};

use crate::anchor::MapRoot;
use crate::errors::SequencerError;
use crate::mutation_log::RecordedOutcome;
use crate::registry::Domain;
use crate::sequencer::RunOutcome;

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, SequencerError> {
    hex::decode(value).map_err(|e| SequencerError::InvalidInput(format!("{}: {}", field, e)))
}

pub fn decode_hex32(field: &str, value: &str) -> Result<[u8; 32], SequencerError> {
    let bytes = decode_hex(field, value)?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| SequencerError::InvalidInput(format!("{}: expected 32 bytes, got {}", field, bytes.len())))
}

#[derive(Debug, Deserialize)]
pub struct CreateDomainRequest {
    pub domain_id: String,
    pub min_interval_ms: Option<u64>,
    pub max_interval_ms: Option<u64>,
    /// Hex Ed25519 seed for the map-head key.
    pub signing_seed: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DomainResponse {
    pub domain_id: String,
    pub log_tree: u64,
    pub map_tree: u64,
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
    pub deleted: bool,
    pub map_public_key: String,
}

impl From<&Domain> for DomainResponse {
    fn from(d: &Domain) -> Self {
        Self {
            domain_id: d.id.0.clone(),
            log_tree: d.log_tree.0,
            map_tree: d.map_tree.0,
            min_interval_ms: d.min_interval_ms,
            max_interval_ms: d.max_interval_ms,
            deleted: d.deleted,
            map_public_key: hex::encode(d.map_public_key),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitMutationRequest {
    pub index: String,
    pub commitment: String,
    pub authorized_keys: Vec<String>,
    /// Hash of the entry being replaced; 64 zeros for a first write.
    pub previous: String,
    pub signatures: Vec<String>,
}

impl SubmitMutationRequest {
    pub fn from_update(index: &LeafIndex, update: &EntryUpdate) -> Self {
        Self {
            index: hex::encode(index.as_bytes()),
            commitment: hex::encode(&update.entry.commitment),
            authorized_keys: update.entry.authorized_keys.iter().map(hex::encode).collect(),
            previous: hex::encode(update.entry.previous),
            signatures: update.signatures.iter().map(hex::encode).collect(),
        }
    }

    /// Decode into the target index and the update. Only hex and lengths of
    /// fixed-size fields are checked here.
    pub fn into_update(self) -> Result<(LeafIndex, EntryUpdate), SequencerError> {
        let target = LeafIndex(decode_hex32("index", &self.index)?);
        let authorized_keys = self
            .authorized_keys
            .iter()
            .map(|k| decode_hex32("authorized_keys", k))
            .collect::<Result<Vec<_>, _>>()?;
        let signatures = self
            .signatures
            .iter()
            .map(|s| decode_hex("signatures", s))
            .collect::<Result<Vec<_>, _>>()?;

        let entry = Entry {
            index: target,
            commitment: decode_hex("commitment", &self.commitment)?,
            authorized_keys,
            previous: decode_hex32("previous", &self.previous)?,
        };
        Ok((target, EntryUpdate { entry, signatures }))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitMutationResponse {
    pub sequence: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RevisionResponse {
    pub revision: u64,
    pub root_hash: String,
    pub high_watermark: u64,
    pub timestamp_ms: u64,
}

impl From<&MapRoot> for RevisionResponse {
    fn from(root: &MapRoot) -> Self {
        Self {
            revision: root.revision.0,
            root_hash: hex::encode(root.root_hash),
            high_watermark: root.metadata.high_watermark.0,
            timestamp_ms: root.metadata.timestamp_ms,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HeadsQuery {
    pub start: Option<u64>,
    pub count: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HeadsResponse {
    pub heads: Vec<SignedMapHead>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SequenceResponse {
    /// "committed", "idle" or "not_due".
    pub status: String,
    pub revision: Option<u64>,
    pub high_watermark: Option<u64>,
    pub accepted: usize,
    pub rejected: usize,
    pub heartbeat: bool,
}

impl From<&RunOutcome> for SequenceResponse {
    fn from(outcome: &RunOutcome) -> Self {
        match outcome {
            RunOutcome::Committed(report) => Self {
                status: "committed".into(),
                revision: Some(report.revision.0),
                high_watermark: Some(report.high_watermark.0),
                accepted: report.accepted,
                rejected: report.rejected,
                heartbeat: report.heartbeat,
            },
            RunOutcome::Idle | RunOutcome::NotDue => Self {
                status: if matches!(outcome, RunOutcome::Idle) { "idle" } else { "not_due" }.into(),
                revision: None,
                high_watermark: None,
                accepted: 0,
                rejected: 0,
                heartbeat: false,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OutcomeResponse {
    pub sequence: u64,
    /// "pending", "accepted" or "rejected".
    pub status: String,
    pub revision: Option<u64>,
    pub reason: Option<String>,
}

impl OutcomeResponse {
    pub fn new(sequence: u64, recorded: Option<RecordedOutcome>) -> Self {
        match recorded {
            None => Self {
                sequence,
                status: "pending".into(),
                revision: None,
                reason: None,
            },
            Some(RecordedOutcome { revision, outcome }) => {
                let (status, reason) = match outcome {
                    MutationOutcome::Accepted => ("accepted", None),
                    MutationOutcome::Rejected(r) => ("rejected", Some(r.to_string())),
                };
                Self {
                    sequence,
                    status: status.into(),
                    revision: Some(revision.0),
                    reason,
                }
            }
        }
    }
}
