// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};

use anyhow::Context;
use keyseq_kernel::batch::{MutationOutcome, OutcomeBatch};
use keyseq_kernel::types::{QueuedMutation, ShortHex};
use keyseq_persistence::log::{decode_frames, Frame};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Summary of a record file, returned so callers can check it.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct InspectReport {
    pub frames: usize,
    pub first_sequence: Option<u64>,
    pub last_sequence: Option<u64>,
    /// Bytes after the last complete frame.
    pub torn_bytes: usize,
}

fn decode<T: DeserializeOwned>(frame: &Frame) -> anyhow::Result<T> {
    let (value, _) = bincode::serde::decode_from_slice(&frame.payload, bincode::config::standard())
        .with_context(|| format!("frame {} has an undecodable payload", frame.sequence))?;
    Ok(value)
}

fn format_time(ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(ms as i64)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

/// Print the contents of a `<domain>.log` or `<domain>.outcomes` file.
///
/// `limit` caps the number of table rows; the summary always covers the
/// whole file.
pub fn run(path: &Path, limit: Option<usize>) -> anyhow::Result<InspectReport> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let (frames, valid_len) = decode_frames(&bytes)?;
    let outcomes = path.extension().is_some_and(|ext| ext == "outcomes");

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let shown = limit.unwrap_or(usize::MAX);
    if outcomes {
        table.set_header(vec!["Revision", "Sequence", "Index", "Outcome"]);
        for frame in frames.iter().take(shown) {
            let batch: OutcomeBatch = decode(frame)?;
            let revision = batch.revision;
            if batch.consumed.is_empty() {
                table.add_row(vec![revision.to_string(), "-".into(), "-".into(), "heartbeat".into()]);
            }
            for c in batch.consumed {
                let outcome = match c.outcome {
                    MutationOutcome::Accepted => "accepted".to_string(),
                    MutationOutcome::Rejected(r) => format!("rejected: {}", r),
                };
                table.add_row(vec![
                    revision.to_string(),
                    c.sequence.to_string(),
                    ShortHex(c.index.as_bytes()).to_string(),
                    outcome,
                ]);
            }
        }
    } else {
        table.set_header(vec!["Sequence", "Index", "Keys", "Signatures", "Admitted"]);
        for frame in frames.iter().take(shown) {
            let m: QueuedMutation = decode(frame)?;
            if m.sequence.0 != frame.sequence {
                anyhow::bail!(
                    "frame {} carries mutation with sequence {}",
                    frame.sequence,
                    m.sequence
                );
            }
            table.add_row(vec![
                m.sequence.to_string(),
                ShortHex(m.index.as_bytes()).to_string(),
                m.update.entry.authorized_keys.len().to_string(),
                m.update.signatures.len().to_string(),
                format_time(m.admitted_at_ms),
            ]);
        }
    }

    let report = InspectReport {
        frames: frames.len(),
        first_sequence: frames.first().map(|f| f.sequence),
        last_sequence: frames.last().map(|f| f.sequence),
        torn_bytes: bytes.len() - valid_len,
    };

    println!("\n{} ({})", path.display(), if outcomes { "outcomes" } else { "mutations" });
    println!("{}", table);
    println!(
        "{} frames, sequences {}..{}",
        report.frames,
        report.first_sequence.unwrap_or(0),
        report.last_sequence.unwrap_or(0)
    );
    if report.torn_bytes > 0 {
        println!("warning: {} bytes of incomplete tail", report.torn_bytes);
    }
    Ok(report)
}
