// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Batch Scheduler: fires the sequencer for every active domain on a timer.
//!
//! - The domain list is snapshotted at the start of each tick
//! - A domain with a run still in flight is skipped for that tick
//! - Each run is bounded by a deadline; an expired run is dropped and the
//!   domain is retried on the next tick
//! - A failing domain never affects the others

use futures::future::join_all;
use keyseq_kernel::types::DomainId;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::errors::SequencerError;
use crate::registry::DomainRegistry;
use crate::sequencer::{RunOutcome, Sequencer};

#[derive(Debug)]
pub enum DomainRun {
    Completed(RunOutcome),
    Failed(SequencerError),
    DeadlineExceeded,
}

/// Domains dispatched by one tick.
pub struct Tick {
    pub dispatched: Vec<DomainId>,
    pub dropped: Vec<DomainId>,
    handles: Vec<(DomainId, JoinHandle<DomainRun>)>,
}

impl Tick {
    /// Wait for every run started by this tick.
    pub async fn wait(self) -> Vec<(DomainId, DomainRun)> {
        let (ids, handles): (Vec<_>, Vec<_>) = self.handles.into_iter().unzip();
        join_all(handles)
            .await
            .into_iter()
            .zip(ids)
            .map(|(joined, id)| {
                let run = match joined {
                    Ok(run) => run,
                    Err(e) => DomainRun::Failed(SequencerError::Inconsistent(format!("run task failed: {}", e))),
                };
                (id, run)
            })
            .collect()
    }
}

type InFlight = Arc<Mutex<HashSet<DomainId>>>;

fn lock_set(set: &InFlight) -> std::sync::MutexGuard<'_, HashSet<DomainId>> {
    match set.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Removes the domain from the in-flight set however the run ends.
struct InFlightGuard {
    set: InFlight,
    id: DomainId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock_set(&self.set).remove(&self.id);
    }
}

pub struct BatchScheduler {
    sequencer: Arc<Sequencer>,
    registry: Arc<dyn DomainRegistry>,
    interval: Duration,
    deadline: Duration,
    in_flight: InFlight,
}

impl BatchScheduler {
    pub fn new(
        sequencer: Arc<Sequencer>,
        registry: Arc<dyn DomainRegistry>,
        interval: Duration,
        deadline: Duration,
    ) -> Self {
        Self {
            sequencer,
            registry,
            interval,
            deadline,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Start one run per idle active domain. Does not wait for them.
    pub async fn tick(&self) -> Result<Tick, SequencerError> {
        let domains = self.registry.list_active_domains().await?;

        let mut tick = Tick {
            dispatched: Vec::new(),
            dropped: Vec::new(),
            handles: Vec::new(),
        };

        for domain in domains {
            let id = domain.id;
            let idle = lock_set(&self.in_flight).insert(id.clone());
            if !idle {
                tracing::debug!(domain = %id, "Previous run still in flight; dropping tick");
                metrics::counter!("keyseq_ticks_dropped_total", 1);
                tick.dropped.push(id);
                continue;
            }

            let guard = InFlightGuard {
                set: self.in_flight.clone(),
                id: id.clone(),
            };
            let sequencer = self.sequencer.clone();
            let deadline = self.deadline;
            let task_id = id.clone();

            let handle = tokio::spawn(async move {
                let _guard = guard;
                run_with_deadline(&sequencer, &task_id, deadline).await
            });
            tick.dispatched.push(id.clone());
            tick.handles.push((id, handle));
        }

        Ok(tick)
    }

    /// One tick, waiting for all of its runs.
    pub async fn run_once(&self) -> Result<Vec<(DomainId, DomainRun)>, SequencerError> {
        Ok(self.tick().await?.wait().await)
    }

    /// Tick on the configured interval until `shutdown` flips to true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            deadline_ms = self.deadline.as_millis() as u64,
            "Batch scheduler started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "Failed to list domains for tick");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Batch scheduler stopped");
    }
}

async fn run_with_deadline(sequencer: &Sequencer, id: &DomainId, deadline: Duration) -> DomainRun {
    match tokio::time::timeout(deadline, sequencer.run_domain(id)).await {
        Ok(Ok(outcome)) => DomainRun::Completed(outcome),
        Ok(Err(e)) => {
            match &e {
                SequencerError::DomainNotFound(_) | SequencerError::DomainDeleted(_) => {
                    tracing::info!(domain = %id, error = %e, "Skipping domain");
                }
                e if e.is_retryable() => {
                    tracing::warn!(domain = %id, error = %e, "Sequencer run failed; retrying next tick");
                }
                e => {
                    tracing::error!(domain = %id, error = %e, "Sequencer run failed");
                }
            }
            DomainRun::Failed(e)
        }
        Err(_) => {
            tracing::warn!(domain = %id, deadline_ms = deadline.as_millis() as u64, "Sequencer run exceeded deadline");
            DomainRun::DeadlineExceeded
        }
    }
}
