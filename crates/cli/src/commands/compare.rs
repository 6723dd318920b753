// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use keyseq_kernel::head::detect_equivocation;
use std::collections::BTreeMap;
use std::path::Path;

use super::{load_heads, parse_public_key};

/// Compare two views of the same domain's log, e.g. served to two different
/// clients. Every revision present in both must carry the same head.
///
/// Returns the number of revisions the views have in common.
pub fn run(left: &Path, right: &Path, public_key: &str) -> anyhow::Result<usize> {
    let key = parse_public_key(public_key)?;
    let left = load_heads(left)?;
    let right: BTreeMap<_, _> = load_heads(right)?
        .into_iter()
        .map(|h| (h.revision(), h))
        .collect();

    let mut shared = 0;
    for head in &left {
        let Some(other) = right.get(&head.revision()) else {
            continue;
        };
        detect_equivocation(head, other, &key).map_err(|e| anyhow::anyhow!("{}", e))?;
        shared += 1;
    }

    println!("\nConsistent: {} shared revisions", shared);
    Ok(shared)
}
