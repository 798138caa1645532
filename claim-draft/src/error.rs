use thiserror::Error;

use crate::claim::{ClaimField, ClaimId};
use crate::generator::GenerationError;

/// Field-level problems surfaced inline next to the offending input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Field '{field}' cannot be empty")]
    EmptyField { field: ClaimField },

    #[error("Field '{field}' has invalid format: {reason}")]
    InvalidFormat { field: ClaimField, reason: String },

    #[error("Unknown claim type: {0}")]
    UnknownClaimType(String),

    #[error("Unknown claim field: {0}")]
    UnknownField(String),

    #[error("Message content cannot be empty")]
    EmptyMessage,

    #[error("Only assistant messages may carry a draft")]
    DraftOnUserMessage,
}

impl ValidationError {
    pub fn empty_field(field: ClaimField) -> Self {
        ValidationError::EmptyField { field }
    }

    pub fn invalid_format(field: ClaimField, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field,
            reason: reason.into(),
        }
    }

    /// The field this error points at, if any.
    pub fn field(&self) -> Option<ClaimField> {
        match self {
            ValidationError::EmptyField { field } | ValidationError::InvalidFormat { field, .. } => {
                Some(*field)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum DraftError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Claim is not ready for drafting; missing: {}", format_fields(.missing))]
    NotEligible { missing: Vec<ClaimField> },

    #[error("A draft is already being generated for claim {claim_id}")]
    Concurrency { claim_id: ClaimId },

    #[error("Draft generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Draft result no longer matches the in-flight request")]
    StaleRequest,

    #[error("Drafting session for claim {0} has ended")]
    SessionClosed(ClaimId),

    #[error("Claim not found: {0}")]
    NotFound(ClaimId),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl DraftError {
    /// Whether the same call can reasonably be repeated without user edits.
    pub fn is_retryable(&self) -> bool {
        match self {
            DraftError::Generation(e) => e.is_transient(),
            DraftError::Concurrency { .. } | DraftError::Persistence(_) => true,
            _ => false,
        }
    }
}

fn format_fields(fields: &[ClaimField]) -> String {
    fields
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, DraftError>;
