// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Error types.
//!
//! Rejections are terminal, per-mutation outcomes. They are values, not
//! failures of the sequencer: a rejected mutation is still consumed.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::types::{Revision, Sequence, ShortHex};

/// Why a mutation failed format or authorization checks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidReason {
    /// The entry's index is not the index the mutation was addressed to.
    IndexMismatch,
    CommitmentTooLarge { len: usize },
    NoAuthorizedKeys,
    TooManyAuthorizedKeys { count: usize },
    /// An authorized key is not a valid Ed25519 point.
    MalformedKey { position: usize },
    MissingSignature,
    MalformedSignature { position: usize },
    /// No signature verified under a key allowed to make this change.
    Unauthorized,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::IndexMismatch => f.write_str("entry index does not match target index"),
            InvalidReason::CommitmentTooLarge { len } => write!(f, "commitment too large ({} bytes)", len),
            InvalidReason::NoAuthorizedKeys => f.write_str("entry has no authorized keys"),
            InvalidReason::TooManyAuthorizedKeys { count } => write!(f, "too many authorized keys ({})", count),
            InvalidReason::MalformedKey { position } => write!(f, "authorized key {} is malformed", position),
            InvalidReason::MissingSignature => f.write_str("update carries no signature"),
            InvalidReason::MalformedSignature { position } => write!(f, "signature {} is malformed", position),
            InvalidReason::Unauthorized => f.write_str("no valid signature from an authorized key"),
        }
    }
}

/// Terminal rejection of a single mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rejection {
    /// Malformed or unauthenticated payload.
    InvalidMutation(InvalidReason),
    /// The mutation references a previous entry other than the current leaf.
    StalePrecondition { expected: [u8; 32], found: [u8; 32] },
}

impl Rejection {
    pub fn is_stale(&self) -> bool {
        matches!(self, Rejection::StalePrecondition { .. })
    }

    /// Stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::InvalidMutation(_) => "invalid_mutation",
            Rejection::StalePrecondition { .. } => "stale_precondition",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::InvalidMutation(reason) => write!(f, "invalid mutation: {}", reason),
            Rejection::StalePrecondition { expected, found } => write!(
                f,
                "stale precondition: current {} but mutation references {}",
                ShortHex(expected),
                ShortHex(found)
            ),
        }
    }
}

pub type MutationResult<T> = core::result::Result<T, Rejection>;

/// A batch handed to the planner was not in strictly increasing sequence order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchError {
    OutOfOrder { previous: Sequence, found: Sequence },
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchError::OutOfOrder { previous, found } => {
                write!(f, "batch out of order: {} followed by {}", previous, found)
            }
        }
    }
}

/// Map head verification failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeadError {
    MalformedKey,
    BadSignature { revision: Revision },
    /// Revisions are not consecutive.
    Gap { expected: Revision, found: Revision },
    WatermarkRegressed { revision: Revision },
    /// Two validly signed heads for the same revision commit to different roots.
    Equivocation { revision: Revision },
    DomainMismatch { revision: Revision },
}

impl fmt::Display for HeadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeadError::MalformedKey => f.write_str("map public key is malformed"),
            HeadError::BadSignature { revision } => write!(f, "bad signature on head {}", revision),
            HeadError::Gap { expected, found } => write!(f, "expected revision {}, found {}", expected, found),
            HeadError::WatermarkRegressed { revision } => write!(f, "watermark went backwards at revision {}", revision),
            HeadError::Equivocation { revision } => write!(f, "equivocation detected at revision {}", revision),
            HeadError::DomainMismatch { revision } => write!(f, "head {} belongs to another domain or map", revision),
        }
    }
}
