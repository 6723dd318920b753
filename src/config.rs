// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Configuration constants.

/// Hash of "no previous entry". A first write to an index must reference it.
pub const EMPTY_ENTRY_HASH: [u8; 32] = [0u8; 32];

/// Maximum size in bytes of an entry commitment.
pub const MAX_COMMITMENT_SIZE: usize = 16 * 1024;

/// Maximum number of keys that may authorize the next update of an entry.
pub const MAX_AUTHORIZED_KEYS: usize = 8;

/// Length of an Ed25519 signature.
pub const SIGNATURE_LEN: usize = 64;

/// Domain separation tags for the canonical hashes.
pub const ENTRY_HASH_TAG: &[u8] = b"keyseq/entry/v1";
pub const MAP_ROOT_TAG: &[u8] = b"keyseq/map-root/v1";
pub const MAP_HEAD_TAG: &[u8] = b"keyseq/map-head/v1";
