// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Domain Registry: tenant configuration and lifecycle.
//!
//! Read-mostly. Only provisioning creates or soft-deletes domains. Deleted
//! domains stay readable through `get` for audit.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use keyseq_kernel::types::{DomainId, TreeId};
use keyseq_persistence::PersistenceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use file::FileRegistry;
pub use memory::MemoryRegistry;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Domain not found: {0}")]
    NotFound(DomainId),
    #[error("Domain already exists: {0}")]
    AlreadyExists(DomainId),
    #[error("Registry persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("Registry file is malformed: {0}")]
    Malformed(String),
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub id: DomainId,
    pub log_tree: TreeId,
    pub map_tree: TreeId,
    /// No revision is created sooner than this after the previous one.
    pub min_interval_ms: u64,
    /// Heartbeat deadline when the domain is idle.
    pub max_interval_ms: u64,
    pub deleted: bool,
    /// Ed25519 seed of the map-head signing key.
    pub map_signing_seed: [u8; 32],
    pub map_public_key: [u8; 32],
}

impl Domain {
    pub fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.map_signing_seed)
    }

    pub fn is_active(&self) -> bool {
        !self.deleted
    }
}

// Keeps the signing seed out of logs.
impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Domain")
            .field("id", &self.id)
            .field("log_tree", &self.log_tree)
            .field("map_tree", &self.map_tree)
            .field("min_interval_ms", &self.min_interval_ms)
            .field("max_interval_ms", &self.max_interval_ms)
            .field("deleted", &self.deleted)
            .field("map_public_key", &hex::encode(self.map_public_key))
            .finish()
    }
}

#[async_trait]
pub trait DomainRegistry: Send + Sync {
    async fn list_active_domains(&self) -> Result<Vec<Domain>, RegistryError>;

    async fn get(&self, id: &DomainId) -> Result<Domain, RegistryError>;

    async fn create(&self, domain: Domain) -> Result<(), RegistryError>;

    /// Soft delete. Deleting an already deleted domain returns it unchanged.
    async fn delete(&self, id: &DomainId) -> Result<Domain, RegistryError>;
}

#[cfg(test)]
pub(crate) fn test_domain(id: &str, seed: u8) -> Domain {
    let key = SigningKey::from_bytes(&[seed; 32]);
    Domain {
        id: DomainId::new(id),
        log_tree: TreeId(seed as u64 * 2),
        map_tree: TreeId(seed as u64 * 2 + 1),
        min_interval_ms: 0,
        max_interval_ms: 60_000,
        deleted: false,
        map_signing_seed: [seed; 32],
        map_public_key: key.verifying_key().to_bytes(),
    }
}
