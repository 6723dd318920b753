// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use async_trait::async_trait;
use keyseq_kernel::types::DomainId;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{Domain, DomainRegistry, RegistryError};

#[derive(Default)]
pub struct MemoryRegistry {
    domains: RwLock<BTreeMap<DomainId, Domain>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Shared by both backends.
pub(crate) fn insert_new(
    domains: &mut BTreeMap<DomainId, Domain>,
    domain: Domain,
) -> Result<(), RegistryError> {
    if domains.contains_key(&domain.id) {
        return Err(RegistryError::AlreadyExists(domain.id));
    }
    domains.insert(domain.id.clone(), domain);
    Ok(())
}

pub(crate) fn mark_deleted(
    domains: &mut BTreeMap<DomainId, Domain>,
    id: &DomainId,
) -> Result<(Domain, bool), RegistryError> {
    let domain = domains
        .get_mut(id)
        .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
    let changed = !domain.deleted;
    domain.deleted = true;
    Ok((domain.clone(), changed))
}

#[async_trait]
impl DomainRegistry for MemoryRegistry {
    async fn list_active_domains(&self) -> Result<Vec<Domain>, RegistryError> {
        let domains = self.domains.read().await;
        Ok(domains.values().filter(|d| d.is_active()).cloned().collect())
    }

    async fn get(&self, id: &DomainId) -> Result<Domain, RegistryError> {
        let domains = self.domains.read().await;
        domains
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    async fn create(&self, domain: Domain) -> Result<(), RegistryError> {
        let mut domains = self.domains.write().await;
        insert_new(&mut domains, domain)
    }

    async fn delete(&self, id: &DomainId) -> Result<Domain, RegistryError> {
        let mut domains = self.domains.write().await;
        mark_deleted(&mut domains, id).map(|(domain, _)| domain)
    }
}
