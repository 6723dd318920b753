// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Anchor wrapper that injects outages, lost acknowledgements and latency.
//! Used to exercise retry and crash-reconciliation paths.

use async_trait::async_trait;
use keyseq_kernel::head::{RevisionMetadata, SignedMapHead};
use keyseq_kernel::types::{Entry, LeafIndex, Revision, TreeId};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use super::{AnchorError, MapRoot, TreeAnchor, TreeKind};

pub struct FaultyAnchor<A> {
    inner: A,
    map_write_failures: AtomicU32,
    lost_map_acks: AtomicU32,
    log_append_failures: AtomicU32,
    map_write_delay_ms: AtomicU64,
}

/// Consume one pending fault, if any.
fn take(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl<A: TreeAnchor> FaultyAnchor<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            map_write_failures: AtomicU32::new(0),
            lost_map_acks: AtomicU32::new(0),
            log_append_failures: AtomicU32::new(0),
            map_write_delay_ms: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// The next `n` map writes fail without reaching storage.
    pub fn fail_map_writes(&self, n: u32) {
        self.map_write_failures.store(n, Ordering::SeqCst);
    }

    /// The next `n` map writes are committed but reported as failed.
    pub fn lose_map_write_acks(&self, n: u32) {
        self.lost_map_acks.store(n, Ordering::SeqCst);
    }

    /// The next `n` log appends fail without reaching storage.
    pub fn fail_log_appends(&self, n: u32) {
        self.log_append_failures.store(n, Ordering::SeqCst);
    }

    pub fn delay_map_writes(&self, delay: Duration) {
        self.map_write_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl<A: TreeAnchor> TreeAnchor for FaultyAnchor<A> {
    async fn create_tree(&self, kind: TreeKind) -> Result<TreeId, AnchorError> {
        self.inner.create_tree(kind).await
    }

    async fn latest_map_root(&self, map_tree: TreeId) -> Result<Option<MapRoot>, AnchorError> {
        self.inner.latest_map_root(map_tree).await
    }

    async fn map_root_at(&self, map_tree: TreeId, revision: Revision) -> Result<MapRoot, AnchorError> {
        self.inner.map_root_at(map_tree, revision).await
    }

    async fn get_leaves(
        &self,
        map_tree: TreeId,
        revision: Revision,
        indices: &[LeafIndex],
    ) -> Result<BTreeMap<LeafIndex, Entry>, AnchorError> {
        self.inner.get_leaves(map_tree, revision, indices).await
    }

    async fn write_map_leaves(
        &self,
        map_tree: TreeId,
        revision: Revision,
        leaves: BTreeMap<LeafIndex, Entry>,
        metadata: RevisionMetadata,
    ) -> Result<MapRoot, AnchorError> {
        let delay = self.map_write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if take(&self.map_write_failures) {
            return Err(AnchorError::Unavailable("injected map write failure".into()));
        }
        let root = self
            .inner
            .write_map_leaves(map_tree, revision, leaves, metadata)
            .await?;
        if take(&self.lost_map_acks) {
            return Err(AnchorError::Unavailable("injected lost map write ack".into()));
        }
        Ok(root)
    }

    async fn append_log_entry(&self, log_tree: TreeId, head: SignedMapHead) -> Result<u64, AnchorError> {
        if take(&self.log_append_failures) {
            return Err(AnchorError::Unavailable("injected log append failure".into()));
        }
        self.inner.append_log_entry(log_tree, head).await
    }

    async fn latest_log_head(&self, log_tree: TreeId) -> Result<Option<SignedMapHead>, AnchorError> {
        self.inner.latest_log_head(log_tree).await
    }

    async fn log_heads(
        &self,
        log_tree: TreeId,
        start: u64,
        count: usize,
    ) -> Result<Vec<SignedMapHead>, AnchorError> {
        self.inner.log_heads(log_tree, start, count).await
    }
}
