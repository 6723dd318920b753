// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use keyseq_kernel::types::{DomainId, Sequence};
use std::sync::Arc;

use crate::admin::{Admin, DomainSpec};
use crate::admission::Admission;
use crate::anchor::TreeAnchor;
use crate::api::*;
use crate::config::SequencerConfig;
use crate::errors::SequencerError;
use crate::mutation_log::MutationLog;
use crate::registry::DomainRegistry;
use crate::sequencer::Sequencer;

const MAX_HEADS_PAGE: usize = 1000;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn DomainRegistry>,
    pub log: Arc<dyn MutationLog>,
    pub anchor: Arc<dyn TreeAnchor>,
    pub sequencer: Arc<Sequencer>,
    pub admission: Arc<Admission>,
    pub admin: Arc<Admin>,
    pub default_min_interval_ms: u64,
    pub default_max_interval_ms: u64,
}

impl AppState {
    pub fn new(
        registry: Arc<dyn DomainRegistry>,
        log: Arc<dyn MutationLog>,
        anchor: Arc<dyn TreeAnchor>,
        sequencer: Arc<Sequencer>,
        clock: Arc<dyn crate::clock::Clock>,
        config: &SequencerConfig,
    ) -> Self {
        let admission = Arc::new(Admission::new(registry.clone(), log.clone(), clock.clone()));
        let admin = Arc::new(Admin::new(registry.clone(), anchor.clone(), clock));
        Self {
            registry,
            log,
            anchor,
            sequencer,
            admission,
            admin,
            default_min_interval_ms: config.default_min_interval_ms,
            default_max_interval_ms: config.default_max_interval_ms,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/domains", post(create_domain))
        .route("/v1/domains/:domain_id", get(get_domain).delete(delete_domain))
        .route("/v1/domains/:domain_id/mutations", post(submit_mutation))
        .route("/v1/domains/:domain_id/mutations/:sequence", get(mutation_outcome))
        .route("/v1/domains/:domain_id/sequence", post(sequence_domain))
        .route("/v1/domains/:domain_id/revisions/latest", get(latest_revision))
        .route("/v1/domains/:domain_id/heads", get(list_heads))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_check))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics_handler() -> String {
    crate::telemetry::get_metrics()
}

async fn create_domain(
    State(state): State<AppState>,
    Json(req): Json<CreateDomainRequest>,
) -> Result<(StatusCode, Json<DomainResponse>), SequencerError> {
    let signing_seed = match &req.signing_seed {
        Some(seed) => Some(decode_hex32("signing_seed", seed)?),
        None => None,
    };
    let spec = DomainSpec {
        id: DomainId::new(req.domain_id),
        min_interval_ms: req.min_interval_ms.unwrap_or(state.default_min_interval_ms),
        max_interval_ms: req.max_interval_ms.unwrap_or(state.default_max_interval_ms),
        signing_seed,
    };
    let domain = state.admin.create_domain(spec).await?;
    Ok((StatusCode::CREATED, Json(DomainResponse::from(&domain))))
}

async fn get_domain(
    State(state): State<AppState>,
    Path(domain_id): Path<String>,
) -> Result<Json<DomainResponse>, SequencerError> {
    let domain = state.registry.get(&DomainId::new(domain_id)).await?;
    Ok(Json(DomainResponse::from(&domain)))
}

async fn delete_domain(
    State(state): State<AppState>,
    Path(domain_id): Path<String>,
) -> Result<Json<DomainResponse>, SequencerError> {
    let domain = state.admin.delete_domain(&DomainId::new(domain_id)).await?;
    Ok(Json(DomainResponse::from(&domain)))
}

async fn submit_mutation(
    State(state): State<AppState>,
    Path(domain_id): Path<String>,
    Json(req): Json<SubmitMutationRequest>,
) -> Result<Json<SubmitMutationResponse>, SequencerError> {
    let (index, update) = req.into_update()?;
    let sequence = state
        .admission
        .submit(&DomainId::new(domain_id), index, update)
        .await?;
    Ok(Json(SubmitMutationResponse { sequence: sequence.0 }))
}

async fn mutation_outcome(
    State(state): State<AppState>,
    Path((domain_id, sequence)): Path<(String, u64)>,
) -> Result<Json<OutcomeResponse>, SequencerError> {
    let id = DomainId::new(domain_id);
    state.registry.get(&id).await?;
    if sequence == 0 || Sequence(sequence) > state.log.highest_sequence(&id).await? {
        return Err(SequencerError::InvalidInput(format!("no mutation with sequence {}", sequence)));
    }
    let recorded = state.log.outcome(&id, Sequence(sequence)).await?;
    Ok(Json(OutcomeResponse::new(sequence, recorded)))
}

/// Run the sequencer for one domain now, outside the scheduler's timer.
async fn sequence_domain(
    State(state): State<AppState>,
    Path(domain_id): Path<String>,
) -> Result<Json<SequenceResponse>, SequencerError> {
    let outcome = state.sequencer.run_domain(&DomainId::new(domain_id)).await?;
    Ok(Json(SequenceResponse::from(&outcome)))
}

async fn latest_revision(
    State(state): State<AppState>,
    Path(domain_id): Path<String>,
) -> Result<Json<RevisionResponse>, SequencerError> {
    let domain = state.registry.get(&DomainId::new(domain_id)).await?;
    let root = state
        .anchor
        .latest_map_root(domain.map_tree)
        .await?
        .ok_or_else(|| SequencerError::Inconsistent(format!("domain {} has no revision 0", domain.id)))?;
    Ok(Json(RevisionResponse::from(&root)))
}

async fn list_heads(
    State(state): State<AppState>,
    Path(domain_id): Path<String>,
    Query(query): Query<HeadsQuery>,
) -> Result<Json<HeadsResponse>, SequencerError> {
    let domain = state.registry.get(&DomainId::new(domain_id)).await?;
    let count = query.count.unwrap_or(MAX_HEADS_PAGE).min(MAX_HEADS_PAGE);
    let heads = state
        .anchor
        .log_heads(domain.log_tree, query.start.unwrap_or(0), count)
        .await?;
    Ok(Json(HeadsResponse { heads }))
}
