// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use keyseq_kernel::error::InvalidReason;
use keyseq_kernel::types::{DomainId, Revision};
use serde_json::json;
use thiserror::Error;

use crate::anchor::AnchorError;
use crate::mutation_log::MutationLogError;
use crate::registry::RegistryError;

#[derive(Error, Debug)]
pub enum SequencerError {
    /// Stateless format check failed at admission.
    #[error("Invalid mutation: {0}")]
    InvalidMutation(InvalidReason),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("Domain not found: {0}")]
    DomainNotFound(DomainId),
    #[error("Domain deleted: {0}")]
    DomainDeleted(DomainId),
    #[error("Domain already exists: {0}")]
    DomainExists(DomainId),
    /// Another writer committed first.
    #[error("Revision conflict: expected {expected}, attempted {attempted}")]
    RevisionConflict { expected: Revision, attempted: Revision },
    /// Durable state that cannot be reconciled. Never retried.
    #[error("Inconsistent state: {0}")]
    Inconsistent(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SequencerError {
    /// Whether the next tick may succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SequencerError::StorageUnavailable(_) | SequencerError::RevisionConflict { .. }
        )
    }

    /// Stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SequencerError::InvalidMutation(_) => "invalid_mutation",
            SequencerError::StorageUnavailable(_) => "storage_unavailable",
            SequencerError::DomainNotFound(_) => "domain_not_found",
            SequencerError::DomainDeleted(_) => "domain_deleted",
            SequencerError::DomainExists(_) => "domain_exists",
            SequencerError::RevisionConflict { .. } => "revision_conflict",
            SequencerError::Inconsistent(_) => "inconsistent",
            SequencerError::InvalidInput(_) => "invalid_input",
        }
    }
}

impl IntoResponse for SequencerError {
    fn into_response(self) -> Response {
        let status = match &self {
            SequencerError::InvalidMutation(_) => StatusCode::BAD_REQUEST,
            SequencerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            SequencerError::DomainNotFound(_) => StatusCode::NOT_FOUND,
            SequencerError::DomainDeleted(_) => StatusCode::GONE,
            SequencerError::DomainExists(_) => StatusCode::CONFLICT,
            SequencerError::RevisionConflict { .. } => StatusCode::CONFLICT,
            SequencerError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            SequencerError::Inconsistent(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
        }));

        (status, body).into_response()
    }
}

impl From<MutationLogError> for SequencerError {
    fn from(e: MutationLogError) -> Self {
        match e {
            MutationLogError::Corrupt { .. } => SequencerError::Inconsistent(e.to_string()),
            MutationLogError::InvalidDomain(id) => {
                SequencerError::InvalidInput(format!("domain id '{}' cannot name a log", id))
            }
            other => SequencerError::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<AnchorError> for SequencerError {
    fn from(e: AnchorError) -> Self {
        match e {
            AnchorError::RevisionConflict { expected, attempted } => {
                SequencerError::RevisionConflict { expected, attempted }
            }
            AnchorError::Unavailable(msg) => SequencerError::StorageUnavailable(msg),
            other => SequencerError::Inconsistent(other.to_string()),
        }
    }
}

impl From<RegistryError> for SequencerError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(id) => SequencerError::DomainNotFound(id),
            RegistryError::AlreadyExists(id) => SequencerError::DomainExists(id),
            other => SequencerError::StorageUnavailable(other.to_string()),
        }
    }
}
