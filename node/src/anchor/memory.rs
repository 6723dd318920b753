// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! In-process stand-in for the verifiable-storage service.
//!
//! A map tree keeps the version history of each index rather than a copy of
//! the map per revision, so a revision costs memory in proportion to the
//! leaves it changed. Historical reads pick the newest version at or before
//! the requested revision.
//!
//! With a journal path every change is first appended to a record file as
//! one [`JournalRecord`] and then applied; opening the anchor replays the
//! journal. A change that cannot be made durable is not applied.

use async_trait::async_trait;
use keyseq_kernel::hash::{entry_hash, map_root_of_hashes};
use keyseq_kernel::head::{RevisionMetadata, SignedMapHead};
use keyseq_kernel::types::{Entry, LeafIndex, Revision, TreeId};
use keyseq_persistence::{LogFile, PersistenceError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::Mutex;

use super::{AnchorError, MapRoot, TreeAnchor, TreeKind};

#[derive(Debug, Default)]
struct MapTree {
    roots: Vec<MapRoot>,
    /// Every value each index has held, oldest first.
    versions: BTreeMap<LeafIndex, Vec<(Revision, Entry)>>,
    /// Entry hash of the current value of each index.
    hashes: BTreeMap<LeafIndex, [u8; 32]>,
}

impl MapTree {
    fn next_revision(&self) -> Revision {
        self.roots
            .last()
            .map(|r| r.revision.next())
            .unwrap_or(Revision::GENESIS)
    }

    fn root(&self, tree: TreeId, revision: Revision) -> Result<&MapRoot, AnchorError> {
        usize::try_from(revision.0)
            .ok()
            .and_then(|i| self.roots.get(i))
            .ok_or(AnchorError::RevisionNotFound { tree, revision })
    }

    fn leaf_at(&self, index: &LeafIndex, revision: Revision) -> Option<&Entry> {
        let versions = self.versions.get(index)?;
        let upto = versions.partition_point(|(r, _)| *r <= revision);
        upto.checked_sub(1).map(|i| &versions[i].1)
    }

    /// Root hash of the map once `leaves` are written over the latest revision.
    fn root_hash_after(&self, leaves: &BTreeMap<LeafIndex, Entry>) -> [u8; 32] {
        if leaves.is_empty() {
            if let Some(last) = self.roots.last() {
                return last.root_hash;
            }
        }
        let mut hashes = self.hashes.clone();
        hashes.extend(leaves.iter().map(|(i, e)| (*i, entry_hash(e))));
        map_root_of_hashes(&hashes)
    }

    fn push(&mut self, root: MapRoot, leaves: BTreeMap<LeafIndex, Entry>) {
        for (index, entry) in leaves {
            self.hashes.insert(index, entry_hash(&entry));
            self.versions.entry(index).or_default().push((root.revision, entry));
        }
        self.roots.push(root);
    }
}

#[derive(Debug)]
enum Tree {
    Log(Vec<SignedMapHead>),
    Map(MapTree),
}

/// One durable change to the anchor.
#[derive(Clone, Debug, Serialize, Deserialize)]
enum JournalRecord {
    CreateTree {
        id: TreeId,
        kind: TreeKind,
    },
    MapRevision {
        tree: TreeId,
        root: MapRoot,
        /// Only the leaves this revision changed.
        leaves: BTreeMap<LeafIndex, Entry>,
    },
    LogHead {
        tree: TreeId,
        head: SignedMapHead,
    },
}

#[derive(Debug, Default)]
struct AnchorState {
    next_tree: u64,
    trees: BTreeMap<TreeId, Tree>,
}

impl AnchorState {
    fn map(&self, id: TreeId) -> Result<&MapTree, AnchorError> {
        match self.trees.get(&id) {
            Some(Tree::Map(map)) => Ok(map),
            Some(Tree::Log(_)) => Err(AnchorError::WrongKind(id, TreeKind::Map)),
            None => Err(AnchorError::TreeNotFound(id)),
        }
    }

    fn log(&self, id: TreeId) -> Result<&Vec<SignedMapHead>, AnchorError> {
        match self.trees.get(&id) {
            Some(Tree::Log(heads)) => Ok(heads),
            Some(Tree::Map(_)) => Err(AnchorError::WrongKind(id, TreeKind::Log)),
            None => Err(AnchorError::TreeNotFound(id)),
        }
    }

    /// Reject a record that does not follow from the current state.
    fn check(&self, record: &JournalRecord) -> Result<(), AnchorError> {
        match record {
            JournalRecord::CreateTree { id, .. } => {
                if id.0 != self.next_tree || self.trees.contains_key(id) {
                    return Err(AnchorError::Corrupt(format!("tree {} created out of order", id)));
                }
            }
            JournalRecord::MapRevision { tree, root, .. } => {
                let expected = self.map(*tree)?.next_revision();
                if root.revision != expected {
                    return Err(AnchorError::RevisionConflict {
                        expected,
                        attempted: root.revision,
                    });
                }
            }
            JournalRecord::LogHead { tree, .. } => {
                self.log(*tree)?;
            }
        }
        Ok(())
    }

    /// Apply a record that passed [`AnchorState::check`].
    fn apply(&mut self, record: JournalRecord) {
        match record {
            JournalRecord::CreateTree { id, kind } => {
                let tree = match kind {
                    TreeKind::Log => Tree::Log(Vec::new()),
                    TreeKind::Map => Tree::Map(MapTree::default()),
                };
                self.trees.insert(id, tree);
                self.next_tree = id.0 + 1;
            }
            JournalRecord::MapRevision { tree, root, leaves } => {
                if let Some(Tree::Map(map)) = self.trees.get_mut(&tree) {
                    map.push(root, leaves);
                }
            }
            JournalRecord::LogHead { tree, head } => {
                if let Some(Tree::Log(heads)) = self.trees.get_mut(&tree) {
                    heads.push(head);
                }
            }
        }
    }
}

fn journal_error(e: PersistenceError) -> AnchorError {
    match e {
        PersistenceError::IoError(e) => AnchorError::Unavailable(e.to_string()),
        other => AnchorError::Corrupt(other.to_string()),
    }
}

#[derive(Default)]
struct Inner {
    state: AnchorState,
    journal: Option<LogFile>,
}

impl Inner {
    /// Make a checked record durable, then apply it.
    fn commit(&mut self, record: JournalRecord) -> Result<(), AnchorError> {
        if let Some(journal) = &mut self.journal {
            let payload = bincode::serde::encode_to_vec(&record, bincode::config::standard())
                .map_err(|e| AnchorError::Unavailable(format!("journal encode failed: {}", e)))?;
            let next = journal.last_sequence() + 1;
            journal
                .append(next, &payload)
                .map_err(|e| AnchorError::Unavailable(e.to_string()))?;
        }
        self.state.apply(record);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAnchor {
    inner: Mutex<Inner>,
}

impl MemoryAnchor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay the journal at `path`, creating it if absent, and append every
    /// later change to it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AnchorError> {
        let path = path.as_ref();
        let (journal, frames) = LogFile::open(path).map_err(journal_error)?;

        let mut state = AnchorState::default();
        let records = frames.len();
        for frame in frames {
            let (record, _): (JournalRecord, usize) =
                bincode::serde::decode_from_slice(&frame.payload, bincode::config::standard())
                    .map_err(|e| AnchorError::Corrupt(format!("journal record {}: {}", frame.sequence, e)))?;
            state
                .check(&record)
                .map_err(|e| AnchorError::Corrupt(format!("journal record {}: {}", frame.sequence, e)))?;
            state.apply(record);
        }

        tracing::info!(path = ?path, trees = state.trees.len(), records, "Replayed tree anchor journal");
        Ok(Self {
            inner: Mutex::new(Inner {
                state,
                journal: Some(journal),
            }),
        })
    }
}

#[async_trait]
impl TreeAnchor for MemoryAnchor {
    async fn create_tree(&self, kind: TreeKind) -> Result<TreeId, AnchorError> {
        let mut inner = self.inner.lock().await;
        let id = TreeId(inner.state.next_tree);
        inner.commit(JournalRecord::CreateTree { id, kind })?;
        Ok(id)
    }

    async fn latest_map_root(&self, map_tree: TreeId) -> Result<Option<MapRoot>, AnchorError> {
        let inner = self.inner.lock().await;
        Ok(inner.state.map(map_tree)?.roots.last().cloned())
    }

    async fn map_root_at(&self, map_tree: TreeId, revision: Revision) -> Result<MapRoot, AnchorError> {
        let inner = self.inner.lock().await;
        Ok(inner.state.map(map_tree)?.root(map_tree, revision)?.clone())
    }

    async fn get_leaves(
        &self,
        map_tree: TreeId,
        revision: Revision,
        indices: &[LeafIndex],
    ) -> Result<BTreeMap<LeafIndex, Entry>, AnchorError> {
        let inner = self.inner.lock().await;
        let map = inner.state.map(map_tree)?;
        map.root(map_tree, revision)?;
        Ok(indices
            .iter()
            .filter_map(|i| map.leaf_at(i, revision).map(|e| (*i, e.clone())))
            .collect())
    }

    async fn write_map_leaves(
        &self,
        map_tree: TreeId,
        revision: Revision,
        leaves: BTreeMap<LeafIndex, Entry>,
        metadata: RevisionMetadata,
    ) -> Result<MapRoot, AnchorError> {
        let mut inner = self.inner.lock().await;
        let map = inner.state.map(map_tree)?;

        let expected = map.next_revision();
        if revision != expected {
            return Err(AnchorError::RevisionConflict {
                expected,
                attempted: revision,
            });
        }

        let root = MapRoot {
            revision,
            root_hash: map.root_hash_after(&leaves),
            metadata,
        };
        inner.commit(JournalRecord::MapRevision {
            tree: map_tree,
            root: root.clone(),
            leaves,
        })?;
        Ok(root)
    }

    async fn append_log_entry(&self, log_tree: TreeId, head: SignedMapHead) -> Result<u64, AnchorError> {
        let mut inner = self.inner.lock().await;
        let index = inner.state.log(log_tree)?.len() as u64;
        inner.commit(JournalRecord::LogHead { tree: log_tree, head })?;
        Ok(index)
    }

    async fn latest_log_head(&self, log_tree: TreeId) -> Result<Option<SignedMapHead>, AnchorError> {
        let inner = self.inner.lock().await;
        Ok(inner.state.log(log_tree)?.last().cloned())
    }

    async fn log_heads(
        &self,
        log_tree: TreeId,
        start: u64,
        count: usize,
    ) -> Result<Vec<SignedMapHead>, AnchorError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .state
            .log(log_tree)?
            .iter()
            .skip(start as usize)
            .take(count)
            .cloned()
            .collect())
    }
}
