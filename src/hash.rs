// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Canonical hashing.
//!
//! Every hash is computed field-by-field over fixed-width little-endian
//! integers and length-prefixed byte strings, behind a domain separation tag.
//! No serializer is involved, so the result cannot drift with encoding
//! library versions.

use alloc::collections::BTreeMap;

use crate::config::{EMPTY_ENTRY_HASH, ENTRY_HASH_TAG, MAP_ROOT_TAG};
use crate::types::{Entry, LeafIndex};

/// Hash of a directory entry. This is what the next update references in
/// `previous` and what authorizing signatures are computed over.
pub fn entry_hash(entry: &Entry) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(ENTRY_HASH_TAG);
    hasher.update(&entry.index.0);

    hasher.update(&(entry.commitment.len() as u64).to_le_bytes());
    hasher.update(&entry.commitment);

    hasher.update(&(entry.authorized_keys.len() as u32).to_le_bytes());
    for key in &entry.authorized_keys {
        hasher.update(key);
    }

    hasher.update(&entry.previous);
    *hasher.finalize().as_bytes()
}

/// The reference a mutation must carry to supersede `leaf`.
pub fn previous_hash(leaf: Option<&Entry>) -> [u8; 32] {
    leaf.map(entry_hash).unwrap_or(EMPTY_ENTRY_HASH)
}

/// Commitment over a full map state.
///
/// The real map root is computed by the external sparse Merkle map; this flat
/// commitment is what the in-process map backend reports. It only needs to be
/// deterministic in the leaf set.
pub fn map_root(leaves: &BTreeMap<LeafIndex, Entry>) -> [u8; 32] {
    let hashes: BTreeMap<LeafIndex, [u8; 32]> = leaves.iter().map(|(i, e)| (*i, entry_hash(e))).collect();
    map_root_of_hashes(&hashes)
}

/// [`map_root`] over precomputed entry hashes.
pub fn map_root_of_hashes(hashes: &BTreeMap<LeafIndex, [u8; 32]>) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(MAP_ROOT_TAG);
    hasher.update(&(hashes.len() as u64).to_le_bytes());
    // BTreeMap iteration is ordered by index.
    for (index, hash) in hashes {
        hasher.update(&index.0);
        hasher.update(hash);
    }
    *hasher.finalize().as_bytes()
}

/// Hash arbitrary bytes (used for log hashes and digests).
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}
