// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use std::sync::OnceLock;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize telemetry (logs + metrics)
pub fn init_telemetry() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "keyseq_node=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    init_metrics();
}

/// Install the Prometheus recorder. Safe to call more than once.
pub fn init_metrics() {
    if PROM_HANDLE.get().is_some() {
        return;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROM_HANDLE.set(handle).is_err() {
                tracing::warn!("Prometheus handle already set. Telemetry re-initialized?");
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install Prometheus recorder; metrics disabled");
            return;
        }
    }

    metrics::describe_counter!("keyseq_revisions_committed_total", "Map revisions committed");
    metrics::describe_counter!("keyseq_mutations_admitted_total", "Mutations accepted into a mutation log");
    metrics::describe_counter!("keyseq_mutations_rejected_total", "Mutations consumed with a terminal rejection");
    metrics::describe_counter!("keyseq_ticks_dropped_total", "Scheduler ticks dropped because the domain was busy");
    metrics::describe_counter!("keyseq_recovery_heads_appended_total", "Map heads re-appended by reconciliation");
    metrics::describe_histogram!("keyseq_batch_duration_seconds", "Time taken by one sequencer run");

    metrics::gauge!("keyseq_node_up", 1.0);
}

/// Get the Prometheus handle to render metrics
pub fn get_metrics() -> String {
    if let Some(handle) = PROM_HANDLE.get() {
        handle.render()
    } else {
        "# metrics not initialized".to_string()
    }
}
