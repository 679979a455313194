use crate::core::rate::RateKind;
use chrono::NaiveDate;
use thiserror::Error;

/// Failure reported by an external collaborator (ledger, case history,
/// notification channel).
#[derive(Debug, Error)]
#[error("{collaborator}: {message}")]
pub struct CollaboratorError {
    pub collaborator: &'static str,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self {
            collaborator,
            message: message.into(),
        }
    }
}

/// Errors raised by registry and plan operations.
///
/// Business-rule variants are never retried: they describe a caller
/// mistake or a conflicting data state.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("no {kind} rate available on {on}")]
    MissingRate { kind: RateKind, on: NaiveDate },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("ledger error: {0}")]
    Ledger(#[source] CollaboratorError),

    #[error("case history error: {0}")]
    History(#[source] CollaboratorError),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// `true` for the caller-facing taxonomy (as opposed to infrastructure).
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            EngineError::Validation(_)
                | EngineError::NotFound { .. }
                | EngineError::Conflict(_)
                | EngineError::PreconditionFailed(_)
                | EngineError::MissingRate { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
