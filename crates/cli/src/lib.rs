// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Offline inspection of sequencer data: mutation logs, outcome logs and
//! exported map heads.

pub mod commands;
