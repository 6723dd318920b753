// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use anyhow::Context;
use clap::Parser;
use keyseq_kernel::mutator::EntryMutator;
use keyseq_node::anchor::MemoryAnchor;
use keyseq_node::clock::SystemClock;
use keyseq_node::config::{HeartbeatPolicy, SequencerConfig};
use keyseq_node::mutation_log::FileMutationLog;
use keyseq_node::recovery::recover_all;
use keyseq_node::registry::FileRegistry;
use keyseq_node::scheduler::BatchScheduler;
use keyseq_node::sequencer::Sequencer;
use keyseq_node::server::{build_router, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "keyseq-sequencer")]
#[command(about = "Mutation sequencer for a verifiable key directory", long_about = None)]
struct Args {
    /// JSON config file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[arg(long)]
    bind: Option<SocketAddr>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    tick_interval_ms: Option<u64>,

    #[arg(long)]
    tick_deadline_ms: Option<u64>,

    /// disabled | max-interval
    #[arg(long)]
    heartbeat: Option<HeartbeatPolicy>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<SequencerConfig> {
        let mut cfg = match &self.config {
            Some(path) => SequencerConfig::from_file(path)?,
            None => SequencerConfig::default(),
        };
        if let Some(v) = self.data_dir {
            cfg.data_dir = v;
        }
        if let Some(v) = self.bind {
            cfg.bind_addr = v;
        }
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }
        if let Some(v) = self.tick_interval_ms {
            cfg.tick_interval_ms = v;
        }
        if let Some(v) = self.tick_deadline_ms {
            cfg.tick_deadline_ms = v;
        }
        if let Some(v) = self.heartbeat {
            cfg.heartbeat = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    keyseq_node::telemetry::init_telemetry();

    let cfg = Args::parse().into_config()?;
    tracing::info!("Initializing keyseq sequencer with config: {:?}", cfg);

    std::fs::create_dir_all(&cfg.data_dir)
        .with_context(|| format!("creating data dir {:?}", cfg.data_dir))?;

    let registry = Arc::new(FileRegistry::open(cfg.registry_path())?);
    let log = Arc::new(FileMutationLog::open(cfg.mutations_dir())?);
    let anchor = Arc::new(MemoryAnchor::open(cfg.anchor_path())?);
    let clock = Arc::new(SystemClock);

    recover_all(registry.as_ref(), log.as_ref(), anchor.as_ref())
        .await
        .context("startup recovery failed")?;

    let sequencer = Arc::new(Sequencer::new(
        registry.clone(),
        log.clone(),
        anchor.clone(),
        Arc::new(EntryMutator::new()),
        clock.clone(),
        &cfg,
    ));

    let scheduler = Arc::new(BatchScheduler::new(
        sequencer.clone(),
        registry.clone(),
        cfg.tick_interval(),
        cfg.tick_deadline(),
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx));

    let state = AppState::new(registry, log, anchor, sequencer, clock, &cfg);
    let app = build_router(state);

    tracing::info!("Listening on {}", cfg.bind_addr);
    let listener = TcpListener::bind(cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown requested");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    scheduler_task.await?;
    Ok(())
}
