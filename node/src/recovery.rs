// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Crash Recovery
//!
//! A revision is committed by its map write. The signed head is appended to
//! the log afterwards, so a crash in between leaves the log behind the map.
//! Reconciliation re-signs and appends the missing heads. Head signatures are
//! deterministic, so a re-appended head is byte-identical to the one that
//! would have been written.
//!
//! Anything else (log ahead of the map, a head that disagrees with the map,
//! a watermark beyond the mutation log) fails closed.

use keyseq_kernel::types::Revision;

use crate::anchor::{MapRoot, TreeAnchor};
use crate::errors::SequencerError;
use crate::mutation_log::MutationLog;
use crate::registry::{Domain, DomainRegistry};
use crate::sequencer::sign_head;

/// Append heads for every revision in `(latest log head, current]`.
/// Returns the number of heads appended.
pub async fn reconcile_heads(
    anchor: &dyn TreeAnchor,
    domain: &Domain,
    current: &MapRoot,
) -> Result<usize, SequencerError> {
    let latest = anchor.latest_log_head(domain.log_tree).await?;

    let mut revision = match &latest {
        Some(signed) => {
            let logged = signed.revision();
            if logged > current.revision {
                return Err(SequencerError::Inconsistent(format!(
                    "domain {}: log head {} is ahead of map revision {}",
                    domain.id, logged, current.revision
                )));
            }
            let root = anchor.map_root_at(domain.map_tree, logged).await?;
            if root.root_hash != signed.head.root_hash || root.metadata != signed.head.metadata {
                return Err(SequencerError::Inconsistent(format!(
                    "domain {}: log head {} does not match the map",
                    domain.id, logged
                )));
            }
            logged.next()
        }
        None => Revision::GENESIS,
    };

    let key = domain.signing_key();
    let mut appended = 0usize;
    while revision <= current.revision {
        let root = if revision == current.revision {
            current.clone()
        } else {
            anchor.map_root_at(domain.map_tree, revision).await?
        };
        anchor
            .append_log_entry(domain.log_tree, sign_head(domain, &root, &key))
            .await?;
        appended += 1;
        revision = revision.next();
    }

    if appended > 0 {
        tracing::warn!(
            domain = %domain.id,
            appended,
            revision = %current.revision,
            "Re-appended missing map heads"
        );
        metrics::counter!("keyseq_recovery_heads_appended_total", appended as u64);
    }
    Ok(appended)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    pub domains_checked: usize,
    pub heads_appended: usize,
}

/// Startup scan over all active domains. Must run before the scheduler
/// starts.
pub async fn recover_all(
    registry: &dyn DomainRegistry,
    log: &dyn MutationLog,
    anchor: &dyn TreeAnchor,
) -> Result<RecoveryReport, SequencerError> {
    let start = std::time::Instant::now();
    let mut report = RecoveryReport::default();

    for domain in registry.list_active_domains().await? {
        let current = anchor
            .latest_map_root(domain.map_tree)
            .await?
            .ok_or_else(|| {
                SequencerError::Inconsistent(format!("domain {} has no revision 0", domain.id))
            })?;

        let highest = log.highest_sequence(&domain.id).await?;
        if current.metadata.high_watermark > highest {
            return Err(SequencerError::Inconsistent(format!(
                "domain {}: watermark {} beyond mutation log head {}",
                domain.id, current.metadata.high_watermark, highest
            )));
        }

        report.heads_appended += reconcile_heads(anchor, &domain, &current).await?;
        report.domains_checked += 1;

        tracing::debug!(
            domain = %domain.id,
            revision = %current.revision,
            watermark = %current.metadata.high_watermark,
            pending = highest.0 - current.metadata.high_watermark.0,
            "Domain recovered"
        );
    }

    tracing::info!(
        domains = report.domains_checked,
        heads_appended = report.heads_appended,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Recovery scan complete"
    );
    Ok(report)
}
