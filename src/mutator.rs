// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Entry Mutator: the state-transition function for a single map leaf.
//!
//! `(previous leaf, mutation) -> new leaf | rejection`
//!
//! # Checks (in order)
//! 1. Format: index, commitment size, key set, signature shapes
//! 2. Precondition: `entry.previous` must be the hash of the current leaf,
//!    or the empty sentinel when the index has never been written
//! 3. Authorization: one signature over the new entry hash must verify under
//!    a key of the current leaf (or, for a first write, of the new entry)
//!
//! The mutator holds no state and performs no I/O. Replaying the same batch
//! after a crash must produce the same leaves.

use alloc::vec::Vec;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};

use crate::config::{MAX_AUTHORIZED_KEYS, MAX_COMMITMENT_SIZE, SIGNATURE_LEN};
use crate::error::{InvalidReason, MutationResult, Rejection};
use crate::hash::{entry_hash, previous_hash};
use crate::types::{Entry, EntryUpdate, LeafIndex, QueuedMutation};

/// Decides whether a mutation may replace the current value of its leaf.
pub trait Mutator: Send + Sync {
    fn mutate(&self, previous: Option<&Entry>, mutation: &QueuedMutation) -> MutationResult<Entry>;
}

/// The directory's optimistic-concurrency mutator.
#[derive(Clone, Copy, Debug, Default)]
pub struct EntryMutator;

impl EntryMutator {
    pub fn new() -> Self {
        EntryMutator
    }
}

impl Mutator for EntryMutator {
    fn mutate(&self, previous: Option<&Entry>, mutation: &QueuedMutation) -> MutationResult<Entry> {
        let update = &mutation.update;
        check_format(&mutation.index, update).map_err(Rejection::InvalidMutation)?;

        let expected = previous_hash(previous);
        if update.entry.previous != expected {
            return Err(Rejection::StalePrecondition {
                expected,
                found: update.entry.previous,
            });
        }

        // Key rotation is authorized by the outgoing key set.
        let authorizing = match previous {
            Some(leaf) => leaf.authorized_keys.as_slice(),
            None => update.entry.authorized_keys.as_slice(),
        };
        let message = entry_hash(&update.entry);
        if !is_authorized(authorizing, &update.signatures, &message) {
            return Err(Rejection::InvalidMutation(InvalidReason::Unauthorized));
        }

        Ok(update.entry.clone())
    }
}

/// Stateless shape checks. Also run at admission so obviously malformed
/// updates never reach the log.
pub fn check_format(target: &LeafIndex, update: &EntryUpdate) -> Result<(), InvalidReason> {
    let entry = &update.entry;

    if entry.index != *target {
        return Err(InvalidReason::IndexMismatch);
    }
    if entry.commitment.len() > MAX_COMMITMENT_SIZE {
        return Err(InvalidReason::CommitmentTooLarge { len: entry.commitment.len() });
    }
    if entry.authorized_keys.is_empty() {
        return Err(InvalidReason::NoAuthorizedKeys);
    }
    if entry.authorized_keys.len() > MAX_AUTHORIZED_KEYS {
        return Err(InvalidReason::TooManyAuthorizedKeys { count: entry.authorized_keys.len() });
    }
    for (position, key) in entry.authorized_keys.iter().enumerate() {
        if VerifyingKey::from_bytes(key).is_err() {
            return Err(InvalidReason::MalformedKey { position });
        }
    }
    if update.signatures.is_empty() {
        return Err(InvalidReason::MissingSignature);
    }
    for (position, signature) in update.signatures.iter().enumerate() {
        if signature.len() != SIGNATURE_LEN {
            return Err(InvalidReason::MalformedSignature { position });
        }
    }
    Ok(())
}

fn is_authorized(keys: &[[u8; 32]], signatures: &[Vec<u8>], message: &[u8; 32]) -> bool {
    keys.iter()
        .filter_map(|key| VerifyingKey::from_bytes(key).ok())
        .any(|key| {
            signatures.iter().any(|raw| {
                let Ok(bytes) = <[u8; SIGNATURE_LEN]>::try_from(raw.as_slice()) else {
                    return false;
                };
                key.verify_strict(message, &Signature::from_bytes(&bytes)).is_ok()
            })
        })
}

/// Build a signed update for `entry`. Client-side helper, also used by tests
/// and the CLI.
pub fn sign_update(entry: Entry, signers: &[&SigningKey]) -> EntryUpdate {
    let message = entry_hash(&entry);
    let signatures = signers
        .iter()
        .map(|key| key.sign(&message).to_bytes().to_vec())
        .collect();
    EntryUpdate { entry, signatures }
}
