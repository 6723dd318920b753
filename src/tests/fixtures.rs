// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Shared builders for kernel tests.

use ed25519_dalek::SigningKey;
use std::vec::Vec;

use crate::hash::previous_hash;
use crate::mutator::sign_update;
use crate::types::{Entry, LeafIndex, QueuedMutation, Sequence};

pub fn key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

pub fn index(n: u8) -> LeafIndex {
    LeafIndex([n; 32])
}

/// Entry at `idx` owned by `owner`, superseding `previous`.
pub fn entry(idx: LeafIndex, value: &[u8], owner: &SigningKey, previous: Option<&Entry>) -> Entry {
    Entry {
        index: idx,
        commitment: value.to_vec(),
        authorized_keys: vec![owner.verifying_key().to_bytes()],
        previous: previous_hash(previous),
    }
}

pub fn queued(sequence: u64, entry: Entry, signers: &[&SigningKey]) -> QueuedMutation {
    QueuedMutation {
        sequence: Sequence(sequence),
        index: entry.index,
        update: sign_update(entry, signers),
        admitted_at_ms: 1_700_000_000_000 + sequence,
    }
}

pub fn sequences(batch: &[QueuedMutation]) -> Vec<u64> {
    batch.iter().map(|m| m.sequence.0).collect()
}
