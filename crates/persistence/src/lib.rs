// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! On-disk primitives for the sequencer node.
//!
//! - [`log`]: append-only, checksummed, sequence-framed record files
//! - [`atomic`]: crash-safe whole-file replacement

pub mod error;
pub mod log;
pub mod atomic;

pub use error::{PersistenceError, Result};
pub use log::{Frame, LogFile};
