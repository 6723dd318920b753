// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod compare;
pub mod inspect;
pub mod verify;

use anyhow::Context;
use keyseq_kernel::head::SignedMapHead;
use serde::Deserialize;
use std::path::Path;

/// Heads as saved from `GET /v1/domains/:id/heads`, or a bare JSON array.
#[derive(Deserialize)]
#[serde(untagged)]
enum HeadsFile {
    Page { heads: Vec<SignedMapHead> },
    Bare(Vec<SignedMapHead>),
}

pub fn load_heads(path: &Path) -> anyhow::Result<Vec<SignedMapHead>> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let file: HeadsFile =
        serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))?;
    Ok(match file {
        HeadsFile::Page { heads } => heads,
        HeadsFile::Bare(heads) => heads,
    })
}

pub fn parse_public_key(hex_key: &str) -> anyhow::Result<[u8; 32]> {
    let bytes = hex::decode(hex_key).context("public key is not hex")?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| anyhow::anyhow!("public key must be 32 bytes, got {}", bytes.len()))
}
