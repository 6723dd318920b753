// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Core data types shared by the kernel and the node.

use core::fmt;

pub mod id;
pub mod entry;

pub use entry::{Entry, EntryUpdate, QueuedMutation};
pub use id::{DomainId, LeafIndex, Revision, Sequence, TreeId};

/// Lower-case hex rendering of a byte slice for `Display` impls.
pub struct Hex<'a>(pub &'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// First eight bytes of a hash, for log lines.
pub struct ShortHex<'a>(pub &'a [u8; 32]);

impl fmt::Display for ShortHex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Hex(&self.0[..8]).fmt(f)
    }
}
