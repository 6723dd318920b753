// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
#![no_std]

//! keyseq-kernel: the deterministic, no_std core of the key-directory sequencer.
//!
//! Everything in this crate is a pure function of its inputs. The node crate
//! performs all I/O and calls into the kernel to decide which mutations are
//! accepted and what the next map revision looks like, so a replayed batch
//! always produces the same leaves, root and head.

extern crate alloc;

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod config;
pub mod error;
pub mod types;
pub mod hash;
pub mod mutator;
pub mod batch;
pub mod head;

#[cfg(test)]
pub mod tests;
