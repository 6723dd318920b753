// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::errors::SequencerError;

/// What the sequencer does when a domain has nothing pending.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeartbeatPolicy {
    /// Never create a revision without mutations.
    Disabled,
    /// Create an empty revision once the domain's max interval has elapsed.
    #[default]
    MaxInterval,
}

impl FromStr for HeartbeatPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disabled" => Ok(HeartbeatPolicy::Disabled),
            "max-interval" => Ok(HeartbeatPolicy::MaxInterval),
            other => Err(format!("unknown heartbeat policy '{}'", other)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    pub data_dir: PathBuf,
    pub bind_addr: SocketAddr,
    /// Maximum mutations folded into one revision.
    pub batch_size: usize,
    pub tick_interval_ms: u64,
    /// A domain run still going after this long is abandoned.
    pub tick_deadline_ms: u64,
    pub heartbeat: HeartbeatPolicy,
    /// Used when a domain is created without explicit intervals.
    pub default_min_interval_ms: u64,
    pub default_max_interval_ms: u64,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./keyseq-data"),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            batch_size: 100,
            tick_interval_ms: 5_000,
            tick_deadline_ms: 30_000,
            heartbeat: HeartbeatPolicy::MaxInterval,
            default_min_interval_ms: 0,
            default_max_interval_ms: 24 * 60 * 60 * 1000,
        }
    }
}

impl SequencerConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, SequencerError> {
        let raw = std::fs::read(path)
            .map_err(|e| SequencerError::InvalidInput(format!("cannot read config {:?}: {}", path, e)))?;
        let cfg: Self = serde_json::from_slice(&raw)
            .map_err(|e| SequencerError::InvalidInput(format!("bad config {:?}: {}", path, e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), SequencerError> {
        if self.batch_size == 0 {
            return Err(SequencerError::InvalidInput("batch_size must be at least 1".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(SequencerError::InvalidInput("tick_interval_ms must be positive".into()));
        }
        if self.tick_deadline_ms == 0 {
            return Err(SequencerError::InvalidInput("tick_deadline_ms must be positive".into()));
        }
        if self.default_min_interval_ms > self.default_max_interval_ms {
            return Err(SequencerError::InvalidInput(
                "default_min_interval_ms exceeds default_max_interval_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn tick_deadline(&self) -> Duration {
        Duration::from_millis(self.tick_deadline_ms)
    }

    pub fn mutations_dir(&self) -> PathBuf {
        self.data_dir.join("mutations")
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join("registry.json")
    }

    pub fn anchor_path(&self) -> PathBuf {
        self.data_dir.join("anchor.journal")
    }
}
