// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Map heads: the signed commitment to one revision that is appended to the
//! domain's log.
//!
//! Anyone holding the domain's public key can check a sequence of heads for
//! gaps and for equivocation (two signed heads for one revision with
//! different roots).

use alloc::vec::Vec;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::config::{MAP_HEAD_TAG, SIGNATURE_LEN};
use crate::error::HeadError;
use crate::types::{DomainId, Revision, Sequence, TreeId};

/// Metadata written atomically with the map leaves of a revision.
///
/// Because the watermark travels inside the map write, a revision can never
/// exist without the watermark that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RevisionMetadata {
    /// Sequence number of the last mutation incorporated into this revision.
    pub high_watermark: Sequence,
    /// Commit wall-clock time (unix millis).
    pub timestamp_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapHead {
    pub domain_id: DomainId,
    pub map_tree: TreeId,
    pub revision: Revision,
    pub root_hash: [u8; 32],
    pub metadata: RevisionMetadata,
}

impl MapHead {
    /// Canonical bytes covered by the head signature.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let domain = self.domain_id.as_str().as_bytes();
        let mut out = Vec::with_capacity(MAP_HEAD_TAG.len() + 4 + domain.len() + 8 * 5 + 32);
        out.extend_from_slice(MAP_HEAD_TAG);
        out.extend_from_slice(&(domain.len() as u32).to_le_bytes());
        out.extend_from_slice(domain);
        out.extend_from_slice(&self.map_tree.0.to_le_bytes());
        out.extend_from_slice(&self.revision.0.to_le_bytes());
        out.extend_from_slice(&self.root_hash);
        out.extend_from_slice(&self.metadata.high_watermark.0.to_le_bytes());
        out.extend_from_slice(&self.metadata.timestamp_ms.to_le_bytes());
        out
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMapHead {
    pub head: MapHead,
    pub signature: Vec<u8>,
}

impl SignedMapHead {
    pub fn sign(head: MapHead, key: &SigningKey) -> Self {
        let signature = key.sign(&head.signing_bytes()).to_bytes().to_vec();
        Self { head, signature }
    }

    pub fn revision(&self) -> Revision {
        self.head.revision
    }

    pub fn verify(&self, public_key: &[u8; 32]) -> Result<(), HeadError> {
        let key = VerifyingKey::from_bytes(public_key).map_err(|_| HeadError::MalformedKey)?;
        let bad = HeadError::BadSignature { revision: self.head.revision };
        let bytes = <[u8; SIGNATURE_LEN]>::try_from(self.signature.as_slice()).map_err(|_| bad.clone())?;
        key.verify_strict(&self.head.signing_bytes(), &Signature::from_bytes(&bytes))
            .map_err(|_| bad)
    }
}

/// Two validly signed heads for the same revision of the same map that
/// disagree on the root or watermark are proof of equivocation.
pub fn detect_equivocation(
    a: &SignedMapHead,
    b: &SignedMapHead,
    public_key: &[u8; 32],
) -> Result<(), HeadError> {
    a.verify(public_key)?;
    b.verify(public_key)?;
    let same_slot = a.head.domain_id == b.head.domain_id
        && a.head.map_tree == b.head.map_tree
        && a.head.revision == b.head.revision;
    if same_slot && (a.head.root_hash != b.head.root_hash || a.head.metadata != b.head.metadata) {
        return Err(HeadError::Equivocation { revision: a.head.revision });
    }
    Ok(())
}

/// Verify a run of heads as served from one log: signatures valid, one map,
/// consecutive revisions, watermark never decreasing.
pub fn verify_head_chain(heads: &[SignedMapHead], public_key: &[u8; 32]) -> Result<(), HeadError> {
    let Some(first) = heads.first() else {
        return Ok(());
    };

    let mut previous: Option<&SignedMapHead> = None;
    for signed in heads {
        signed.verify(public_key)?;
        let head = &signed.head;
        if head.domain_id != first.head.domain_id || head.map_tree != first.head.map_tree {
            return Err(HeadError::DomainMismatch { revision: head.revision });
        }
        if let Some(prev) = previous {
            let expected = prev.head.revision.next();
            if head.revision != expected {
                return Err(HeadError::Gap { expected, found: head.revision });
            }
            if head.metadata.high_watermark < prev.head.metadata.high_watermark {
                return Err(HeadError::WatermarkRegressed { revision: head.revision });
            }
        }
        previous = Some(signed);
    }
    Ok(())
}
