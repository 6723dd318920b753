// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use ed25519_dalek::SigningKey;
use keyseq_cli::commands::{compare, inspect, verify};
use keyseq_kernel::batch::{ConsumedMutation, MutationOutcome, OutcomeBatch};
use keyseq_kernel::head::{MapHead, RevisionMetadata, SignedMapHead};
use keyseq_kernel::types::{DomainId, Entry, EntryUpdate, LeafIndex, QueuedMutation, Revision, Sequence, TreeId};
use keyseq_persistence::LogFile;
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;

fn encode<T: serde::Serialize>(value: &T) -> Vec<u8> {
    bincode::serde::encode_to_vec(value, bincode::config::standard()).unwrap()
}

fn queued(sequence: u64) -> QueuedMutation {
    let index = LeafIndex([sequence as u8; 32]);
    QueuedMutation {
        sequence: Sequence(sequence),
        index,
        update: EntryUpdate {
            entry: Entry {
                index,
                commitment: b"value".to_vec(),
                authorized_keys: vec![[7; 32]],
                previous: [0; 32],
            },
            signatures: vec![vec![0; 64]],
        },
        admitted_at_ms: 1_700_000_000_000,
    }
}

fn head(key: &SigningKey, revision: u64, watermark: u64, root: u8) -> SignedMapHead {
    SignedMapHead::sign(
        MapHead {
            domain_id: DomainId::new("d1"),
            map_tree: TreeId(2),
            revision: Revision(revision),
            root_hash: [root; 32],
            metadata: RevisionMetadata {
                high_watermark: Sequence(watermark),
                timestamp_ms: 1_700_000_000_000 + revision,
            },
        },
        key,
    )
}

fn write_heads(path: &Path, heads: &[SignedMapHead]) {
    let body = serde_json::json!({ "heads": heads });
    std::fs::write(path, serde_json::to_vec(&body).unwrap()).unwrap();
}

#[test]
fn test_inspect_mutation_log() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("d1.log");
    {
        let (mut log, _) = LogFile::open(&path).unwrap();
        for seq in 1..=3 {
            log.append(seq, &encode(&queued(seq))).unwrap();
        }
    }

    let report = inspect::run(&path, None).unwrap();
    assert_eq!(report.frames, 3);
    assert_eq!(report.first_sequence, Some(1));
    assert_eq!(report.last_sequence, Some(3));
    assert_eq!(report.torn_bytes, 0);

    // A torn tail is reported, not fatal.
    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[1, 2, 3]).unwrap();
    let report = inspect::run(&path, Some(1)).unwrap();
    assert_eq!(report.frames, 3);
    assert_eq!(report.torn_bytes, 3);
}

#[test]
fn test_inspect_outcome_log() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("d1.outcomes");
    {
        let (mut log, _) = LogFile::open(&path).unwrap();
        let recorded = OutcomeBatch {
            revision: Revision(1),
            consumed: vec![ConsumedMutation {
                sequence: Sequence(1),
                index: LeafIndex([1; 32]),
                outcome: MutationOutcome::Accepted,
            }],
        };
        log.append(1, &encode(&recorded)).unwrap();
        let heartbeat = OutcomeBatch {
            revision: Revision(2),
            consumed: Vec::new(),
        };
        log.append(2, &encode(&heartbeat)).unwrap();
    }

    let report = inspect::run(&path, None).unwrap();
    assert_eq!(report.frames, 2);
    assert_eq!(report.last_sequence, Some(2));
}

#[test]
fn test_inspect_rejects_mismatched_payload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("d1.log");
    {
        let (mut log, _) = LogFile::open(&path).unwrap();
        log.append(1, &encode(&queued(5))).unwrap();
    }
    assert!(inspect::run(&path, None).is_err());
}

#[test]
fn test_verify_heads() {
    let dir = tempdir().unwrap();
    let key = SigningKey::from_bytes(&[9; 32]);
    let public_key = hex::encode(key.verifying_key().to_bytes());

    let good = dir.path().join("good.json");
    write_heads(&good, &[head(&key, 0, 0, 1), head(&key, 1, 2, 2), head(&key, 2, 2, 3)]);
    assert!(verify::run(&good, &public_key).is_ok());

    let gap = dir.path().join("gap.json");
    write_heads(&gap, &[head(&key, 0, 0, 1), head(&key, 2, 2, 3)]);
    assert!(verify::run(&gap, &public_key).is_err());

    let other_key = hex::encode(SigningKey::from_bytes(&[8; 32]).verifying_key().to_bytes());
    assert!(verify::run(&good, &other_key).is_err());
    assert!(verify::run(&good, "abcd").is_err());
}

#[test]
fn test_compare_heads_detects_equivocation() {
    let dir = tempdir().unwrap();
    let key = SigningKey::from_bytes(&[9; 32]);
    let public_key = hex::encode(key.verifying_key().to_bytes());

    let left = dir.path().join("left.json");
    let right = dir.path().join("right.json");
    write_heads(&left, &[head(&key, 0, 0, 1), head(&key, 1, 1, 2)]);

    // A shorter but consistent view.
    std::fs::write(&right, serde_json::to_vec(&vec![head(&key, 0, 0, 1)]).unwrap()).unwrap();
    assert_eq!(compare::run(&left, &right, &public_key).unwrap(), 1);

    // Same revision, different root.
    write_heads(&right, &[head(&key, 0, 0, 1), head(&key, 1, 1, 9)]);
    assert!(compare::run(&left, &right, &public_key).is_err());
}
