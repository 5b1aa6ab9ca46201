//! Crate-wide error type.
//!
//! One variant per cause, not per type hierarchy, so callers can match on
//! *why* something failed rather than which layer raised it.

use thiserror::Error;

/// Errors surfaced by the orchestrator core.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("generation state not found for project: {0}")]
    StateNotFound(String),

    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("external collaborator failed: {collaborator}: {message}")]
    CollaboratorFailed {
        collaborator: &'static str,
        message: String,
    },

    #[error("merge conflict could not be resolved: {0}")]
    MergeConflictUnresolved(String),

    #[error("concurrency conflict: {entity} {id} was modified concurrently")]
    ConcurrencyConflict { entity: &'static str, id: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias used throughout the orchestrator core.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
