// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use thiserror::Error;
use std::io;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Invalid magic bytes in header")]
    InvalidMagic,
    #[error("Unsupported format version {0}")]
    UnsupportedVersion(u32),
    #[error("Checksum mismatch in frame {sequence} at offset {offset}: expected {expected}, found {found}")]
    ChecksumMismatch {
        sequence: u64,
        offset: usize,
        expected: u64,
        found: u64,
    },
    #[error("Sequence {found} does not follow {last}")]
    SequenceOrder {
        last: u64,
        found: u64,
    },
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
