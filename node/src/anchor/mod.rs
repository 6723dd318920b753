// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Tree Anchor Client: the boundary to the verifiable-storage service that
//! hosts each domain's append-only log tree and sparse map tree.
//!
//! Operations are linearizable per tree. Map writes are compare-and-swap on
//! the revision number: only `latest + 1` (or 0 for a fresh tree) is accepted.

pub mod faulty;
pub mod memory;

use async_trait::async_trait;
use keyseq_kernel::head::{RevisionMetadata, SignedMapHead};
use keyseq_kernel::types::{Entry, LeafIndex, Revision, TreeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub use faulty::FaultyAnchor;
pub use memory::MemoryAnchor;

#[derive(Error, Debug)]
pub enum AnchorError {
    #[error("Tree storage unavailable: {0}")]
    Unavailable(String),
    #[error("Tree not found: {0}")]
    TreeNotFound(TreeId),
    #[error("Tree {0} is not a {1:?} tree")]
    WrongKind(TreeId, TreeKind),
    #[error("Map {tree} has no revision {revision}")]
    RevisionNotFound { tree: TreeId, revision: Revision },
    /// The CAS on the map revision failed.
    #[error("Revision conflict: expected {expected}, attempted {attempted}")]
    RevisionConflict { expected: Revision, attempted: Revision },
    #[error("Anchor state corrupt: {0}")]
    Corrupt(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeKind {
    Log,
    Map,
}

/// Root of one committed map revision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapRoot {
    pub revision: Revision,
    pub root_hash: [u8; 32],
    pub metadata: RevisionMetadata,
}

#[async_trait]
pub trait TreeAnchor: Send + Sync {
    async fn create_tree(&self, kind: TreeKind) -> Result<TreeId, AnchorError>;

    /// `None` until revision 0 has been written.
    async fn latest_map_root(&self, map_tree: TreeId) -> Result<Option<MapRoot>, AnchorError>;

    async fn map_root_at(&self, map_tree: TreeId, revision: Revision) -> Result<MapRoot, AnchorError>;

    /// Leaf values at `revision` for the requested indices. Indices never
    /// written are absent from the result.
    async fn get_leaves(
        &self,
        map_tree: TreeId,
        revision: Revision,
        indices: &[LeafIndex],
    ) -> Result<BTreeMap<LeafIndex, Entry>, AnchorError>;

    /// Write `leaves` on top of the latest revision as `revision`, together
    /// with `metadata`. Fails with `RevisionConflict` unless `revision` is
    /// exactly the next one.
    async fn write_map_leaves(
        &self,
        map_tree: TreeId,
        revision: Revision,
        leaves: BTreeMap<LeafIndex, Entry>,
        metadata: RevisionMetadata,
    ) -> Result<MapRoot, AnchorError>;

    /// Append a signed head, returning its index in the log.
    async fn append_log_entry(&self, log_tree: TreeId, head: SignedMapHead) -> Result<u64, AnchorError>;

    async fn latest_log_head(&self, log_tree: TreeId) -> Result<Option<SignedMapHead>, AnchorError>;

    /// Up to `count` heads starting at log index `start`.
    async fn log_heads(
        &self,
        log_tree: TreeId,
        start: u64,
        count: usize,
    ) -> Result<Vec<SignedMapHead>, AnchorError>;
}
