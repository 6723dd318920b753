// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use keyseq_kernel::head::verify_head_chain;
use std::path::Path;

use super::{load_heads, parse_public_key};

/// Check an exported run of heads: signatures, consecutive revisions and a
/// non-decreasing watermark.
pub fn run(heads_path: &Path, public_key: &str) -> anyhow::Result<()> {
    let key = parse_public_key(public_key)?;
    let heads = load_heads(heads_path)?;

    match verify_head_chain(&heads, &key) {
        Ok(()) => {
            println!("\nVERIFIED\n");
            match (heads.first(), heads.last()) {
                (Some(first), Some(last)) => {
                    println!("Domain:    {}", first.head.domain_id);
                    println!("Revisions: {}..{}", first.revision(), last.revision());
                    println!("Watermark: {}", last.head.metadata.high_watermark);
                }
                _ => println!("No heads in file."),
            }
            Ok(())
        }
        Err(e) => {
            println!("\nFAILED\n");
            Err(anyhow::anyhow!("head chain invalid: {}", e))
        }
    }
}
