// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
#![allow(dead_code)]

use ed25519_dalek::SigningKey;
use keyseq_kernel::config::EMPTY_ENTRY_HASH;
use keyseq_kernel::mutator::{sign_update, EntryMutator};
use keyseq_kernel::types::{DomainId, Entry, EntryUpdate, LeafIndex, Revision};
use keyseq_node::admin::{Admin, DomainSpec};
use keyseq_node::admission::Admission;
use keyseq_node::anchor::{FaultyAnchor, MapRoot, MemoryAnchor, TreeAnchor};
use keyseq_node::clock::ManualClock;
use keyseq_node::config::{HeartbeatPolicy, SequencerConfig};
use keyseq_node::mutation_log::{MemoryMutationLog, MutationLog};
use keyseq_node::registry::{Domain, DomainRegistry, MemoryRegistry};
use keyseq_node::sequencer::Sequencer;
use std::sync::Arc;

pub const START_MS: u64 = 1_700_000_000_000;

pub struct Harness {
    pub config: SequencerConfig,
    pub registry: Arc<MemoryRegistry>,
    pub log: Arc<MemoryMutationLog>,
    pub anchor: Arc<FaultyAnchor<MemoryAnchor>>,
    pub clock: Arc<ManualClock>,
    pub sequencer: Arc<Sequencer>,
    pub admission: Admission,
    pub admin: Admin,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SequencerConfig::default())
    }

    pub fn with_heartbeat(heartbeat: HeartbeatPolicy) -> Self {
        Self::with_config(SequencerConfig {
            heartbeat,
            ..SequencerConfig::default()
        })
    }

    pub fn with_config(config: SequencerConfig) -> Self {
        let registry = Arc::new(MemoryRegistry::new());
        let log = Arc::new(MemoryMutationLog::new());
        let anchor = Arc::new(FaultyAnchor::new(MemoryAnchor::new()));
        let clock = Arc::new(ManualClock::new(START_MS));
        Self::assemble(config, registry, log, anchor, clock)
    }

    /// Rebuild the service around the same storage, as after a restart.
    pub fn restart(&self) -> Self {
        Self::assemble(
            self.config.clone(),
            self.registry.clone(),
            self.log.clone(),
            self.anchor.clone(),
            self.clock.clone(),
        )
    }

    fn assemble(
        config: SequencerConfig,
        registry: Arc<MemoryRegistry>,
        log: Arc<MemoryMutationLog>,
        anchor: Arc<FaultyAnchor<MemoryAnchor>>,
        clock: Arc<ManualClock>,
    ) -> Self {
        let sequencer = Arc::new(Sequencer::new(
            registry.clone(),
            log.clone(),
            anchor.clone(),
            Arc::new(EntryMutator::new()),
            clock.clone(),
            &config,
        ));
        let admission = Admission::new(registry.clone(), log.clone(), clock.clone());
        let admin = Admin::new(registry.clone(), anchor.clone(), clock.clone());
        Self {
            config,
            registry,
            log,
            anchor,
            clock,
            sequencer,
            admission,
            admin,
        }
    }

    pub async fn create_domain(&self, id: &str, seed: u8) -> Domain {
        self.create_domain_with(id, seed, 0, 60_000).await
    }

    pub async fn create_domain_with(&self, id: &str, seed: u8, min_ms: u64, max_ms: u64) -> Domain {
        self.admin
            .create_domain(DomainSpec {
                id: DomainId::new(id),
                min_interval_ms: min_ms,
                max_interval_ms: max_ms,
                signing_seed: Some([seed; 32]),
            })
            .await
            .unwrap()
    }

    pub async fn submit(&self, domain: &str, update: EntryUpdate) -> u64 {
        let index = update.entry.index;
        self.admission
            .submit(&DomainId::new(domain), index, update)
            .await
            .unwrap()
            .0
    }

    pub async fn latest(&self, domain: &Domain) -> MapRoot {
        self.anchor.latest_map_root(domain.map_tree).await.unwrap().unwrap()
    }

    pub async fn leaf(&self, domain: &Domain, revision: u64, index: LeafIndex) -> Option<Entry> {
        self.anchor
            .get_leaves(domain.map_tree, Revision(revision), &[index])
            .await
            .unwrap()
            .remove(&index)
    }

    pub async fn heads(&self, domain: &Domain) -> Vec<keyseq_kernel::head::SignedMapHead> {
        self.anchor.log_heads(domain.log_tree, 0, 10_000).await.unwrap()
    }

    pub async fn pending(&self, domain: &str) -> u64 {
        self.log.highest_sequence(&DomainId::new(domain)).await.unwrap().0
    }

    pub async fn domain(&self, id: &str) -> Domain {
        self.registry.get(&DomainId::new(id)).await.unwrap()
    }
}

pub fn key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

pub fn index(n: u8) -> LeafIndex {
    LeafIndex([n; 32])
}

/// Entry for `idx` owned by `owner`, replacing the entry with hash `previous`.
pub fn entry(idx: LeafIndex, value: &[u8], owner: &SigningKey, previous: [u8; 32]) -> Entry {
    Entry {
        index: idx,
        commitment: value.to_vec(),
        authorized_keys: vec![owner.verifying_key().to_bytes()],
        previous,
    }
}

pub fn first_write(idx: LeafIndex, value: &[u8], owner: &SigningKey) -> Entry {
    entry(idx, value, owner, EMPTY_ENTRY_HASH)
}

pub fn signed(entry: Entry, signer: &SigningKey) -> EntryUpdate {
    sign_update(entry, &[signer])
}
