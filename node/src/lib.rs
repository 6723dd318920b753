// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod config;
pub mod errors;
pub mod telemetry;
pub mod clock;
pub mod mutation_log;
pub mod registry;
pub mod anchor;
pub mod sequencer;
pub mod scheduler;
pub mod recovery;
pub mod admission;
pub mod admin;
pub mod api;
pub mod server;
