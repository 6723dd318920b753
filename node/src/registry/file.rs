// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Registry persisted as one JSON document, replaced atomically on change.

use async_trait::async_trait;
use keyseq_kernel::types::DomainId;
use keyseq_persistence::atomic::{read_optional, write_atomic};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use super::memory::{insert_new, mark_deleted};
use super::{Domain, DomainRegistry, RegistryError};

pub struct FileRegistry {
    path: PathBuf,
    domains: RwLock<BTreeMap<DomainId, Domain>>,
}

impl FileRegistry {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref().to_path_buf();
        let domains = match read_optional(&path)? {
            Some(bytes) => {
                let list: Vec<Domain> =
                    serde_json::from_slice(&bytes).map_err(|e| RegistryError::Malformed(e.to_string()))?;
                list.into_iter().map(|d| (d.id.clone(), d)).collect()
            }
            None => BTreeMap::new(),
        };
        tracing::info!(path = ?path, domains = domains.len(), "Loaded domain registry");
        Ok(Self {
            path,
            domains: RwLock::new(domains),
        })
    }

    fn persist(&self, domains: &BTreeMap<DomainId, Domain>) -> Result<(), RegistryError> {
        let list: Vec<&Domain> = domains.values().collect();
        let bytes = serde_json::to_vec_pretty(&list).map_err(|e| RegistryError::Malformed(e.to_string()))?;
        write_atomic(&self.path, &bytes)?;
        Ok(())
    }
}

#[async_trait]
impl DomainRegistry for FileRegistry {
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
        let mut next = domains.clone();
        insert_new(&mut next, domain)?;
        self.persist(&next)?;
        *domains = next;
        Ok(())
    }

    async fn delete(&self, id: &DomainId) -> Result<Domain, RegistryError> {
        let mut domains = self.domains.write().await;
        let mut next = domains.clone();
        let (domain, changed) = mark_deleted(&mut next, id)?;
        if changed {
            self.persist(&next)?;
            *domains = next;
        }
        Ok(domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::test_domain;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_registry_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");

        {
            let registry = FileRegistry::open(&path).unwrap();
            registry.create(test_domain("d1", 1)).await.unwrap();
            registry.create(test_domain("d2", 2)).await.unwrap();
            registry.delete(&DomainId::new("d2")).await.unwrap();
        }

        let registry = FileRegistry::open(&path).unwrap();
        let d1 = registry.get(&DomainId::new("d1")).await.unwrap();
        assert_eq!(d1, test_domain("d1", 1));
        assert!(registry.get(&DomainId::new("d2")).await.unwrap().deleted);
        assert_eq!(registry.list_active_domains().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_file_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(FileRegistry::open(&path), Err(RegistryError::Malformed(_))));
    }
}
