// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Domain provisioning.
//!
//! Creating a domain allocates its log and map trees, commits the empty
//! revision 0, appends its signed head, and only then registers the domain.
//! A crash part way through leaves unreferenced trees and nothing else.

use ed25519_dalek::SigningKey;
use keyseq_kernel::head::RevisionMetadata;
use keyseq_kernel::types::{DomainId, Revision, Sequence};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::anchor::{TreeAnchor, TreeKind};
use crate::clock::Clock;
use crate::errors::SequencerError;
use crate::mutation_log::file::is_storable_domain_id;
use crate::registry::{Domain, DomainRegistry};
use crate::sequencer::sign_head;

#[derive(Clone, Debug)]
pub struct DomainSpec {
    pub id: DomainId,
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
    /// Map-head signing seed. Generated when absent.
    pub signing_seed: Option<[u8; 32]>,
}

pub struct Admin {
    registry: Arc<dyn DomainRegistry>,
    anchor: Arc<dyn TreeAnchor>,
    clock: Arc<dyn Clock>,
}

impl Admin {
    pub fn new(registry: Arc<dyn DomainRegistry>, anchor: Arc<dyn TreeAnchor>, clock: Arc<dyn Clock>) -> Self {
        Self { registry, anchor, clock }
    }

    pub async fn create_domain(&self, spec: DomainSpec) -> Result<Domain, SequencerError> {
        if !is_storable_domain_id(spec.id.as_str()) {
            return Err(SequencerError::InvalidInput(format!(
                "domain id '{}' must be 1-128 chars of [A-Za-z0-9._-] and not start with '.'",
                spec.id
            )));
        }
        if spec.min_interval_ms > spec.max_interval_ms {
            return Err(SequencerError::InvalidInput(
                "min_interval_ms exceeds max_interval_ms".into(),
            ));
        }
        match self.registry.get(&spec.id).await {
            Ok(_) => return Err(SequencerError::DomainExists(spec.id)),
            Err(crate::registry::RegistryError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let key = match spec.signing_seed {
            Some(seed) => SigningKey::from_bytes(&seed),
            None => SigningKey::generate(&mut rand::rngs::OsRng),
        };

        let log_tree = self.anchor.create_tree(TreeKind::Log).await?;
        let map_tree = self.anchor.create_tree(TreeKind::Map).await?;

        let domain = Domain {
            id: spec.id,
            log_tree,
            map_tree,
            min_interval_ms: spec.min_interval_ms,
            max_interval_ms: spec.max_interval_ms,
            deleted: false,
            map_signing_seed: key.to_bytes(),
            map_public_key: key.verifying_key().to_bytes(),
        };

        let metadata = RevisionMetadata {
            high_watermark: Sequence::ZERO,
            timestamp_ms: self.clock.now_ms(),
        };
        let root = self
            .anchor
            .write_map_leaves(map_tree, Revision::GENESIS, BTreeMap::new(), metadata)
            .await?;
        self.anchor
            .append_log_entry(log_tree, sign_head(&domain, &root, &key))
            .await?;

        self.registry.create(domain.clone()).await?;

        tracing::info!(
            domain = %domain.id,
            log_tree = %log_tree,
            map_tree = %map_tree,
            "Domain created"
        );
        Ok(domain)
    }

    /// Soft delete: the sequencer stops producing revisions and admission
    /// refuses writes. History stays readable.
    pub async fn delete_domain(&self, id: &DomainId) -> Result<Domain, SequencerError> {
        let domain = self.registry.delete(id).await?;
        tracing::info!(domain = %id, "Domain deleted");
        Ok(domain)
    }
}
