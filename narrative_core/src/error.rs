//! Error taxonomy for the narrative engine.
//!
//! Validation and referential-integrity problems are normally contained by the
//! fact integration pipeline and reported as warnings; generation failures and
//! illegal beat transitions abort the tick.

use story_bible::{BeatStatus, EntityId, EntityKind, IdError, ThresholdError};
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NarrativeError>;

/// Errors produced by the engine.
#[derive(Debug, Error)]
pub enum NarrativeError {
    #[error("{kind} `{id}` not found")]
    NotFound { kind: EntityKind, id: EntityId },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("reference to unknown entity `{missing}`")]
    ReferentialIntegrity { missing: EntityId },

    #[error("plot beat `{beat}` cannot move from {from} to {to}")]
    InvalidTransition {
        beat: EntityId,
        from: BeatStatus,
        to: BeatStatus,
    },

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("invalid entity id: {0}")]
    Id(#[from] IdError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl NarrativeError {
    pub fn not_found(id: EntityId) -> Self {
        NarrativeError::NotFound {
            kind: id.kind(),
            id,
        }
    }

    /// Whether the error is contained locally (skip + warn) rather than aborting a tick.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            NarrativeError::Validation(_)
                | NarrativeError::ReferentialIntegrity { .. }
                | NarrativeError::NotFound { .. }
                | NarrativeError::Id(_)
        )
    }
}

impl From<ThresholdError> for NarrativeError {
    fn from(err: ThresholdError) -> Self {
        NarrativeError::Config(err.to_string())
    }
}

/// Failures of external collaborators (planner, writer, extractor, beat generator).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("{stage} returned unusable output: {reason}")]
    Malformed { stage: String, reason: String },

    #[error("{stage} is unavailable: {reason}")]
    Unavailable { stage: String, reason: String },

    #[error("{stage} exceeded its time budget ({elapsed_ms} ms > {limit_ms} ms)")]
    TimedOut {
        stage: String,
        elapsed_ms: u64,
        limit_ms: u64,
    },

    #[error("{stage} output rejected: {reason}")]
    Rejected { stage: String, reason: String },
}

impl GenerationError {
    pub fn malformed(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        GenerationError::Malformed {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    pub fn unavailable(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        GenerationError::Unavailable {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    pub fn rejected(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        GenerationError::Rejected {
            stage: stage.into(),
            reason: reason.into(),
        }
    }
}
