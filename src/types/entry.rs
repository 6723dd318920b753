// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Directory entries and the mutations that replace them.

use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use super::id::{LeafIndex, Sequence};
use crate::hash::entry_hash;

/// Value of one map leaf: the current key material commitment for a user,
/// the keys allowed to authorize the next change, and a link to the entry
/// this one replaced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub index: LeafIndex,
    /// Opaque commitment to the user's key material.
    pub commitment: Vec<u8>,
    /// Ed25519 public keys that may sign the next update of this entry.
    pub authorized_keys: Vec<[u8; 32]>,
    /// Hash of the superseded entry, or `EMPTY_ENTRY_HASH` for a first write.
    pub previous: [u8; 32],
}

impl Entry {
    pub fn hash(&self) -> [u8; 32] {
        entry_hash(self)
    }
}

/// A proposed new entry together with the signatures authorizing it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryUpdate {
    pub entry: Entry,
    /// Ed25519 signatures over `entry.hash()`.
    pub signatures: Vec<Vec<u8>>,
}

/// A mutation as stored in a domain's mutation log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMutation {
    pub sequence: Sequence,
    /// Target index the client addressed. Must match `update.entry.index`.
    pub index: LeafIndex,
    pub update: EntryUpdate,
    /// Admission wall-clock time (unix millis). Informational only.
    pub admitted_at_ms: u64,
}
