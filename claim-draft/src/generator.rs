use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::claim::{ClaimFormData, ClaimId, ClaimType};
use crate::message::{ChatMessage, DraftPayload};
use crate::validator::ValidationReport;

/// Whether a failed generation is worth retrying as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationErrorKind {
    /// Network trouble, rate limiting, timeouts.
    Transient,
    /// Malformed output or an upstream rejection; retrying without edits will likely fail again.
    Permanent,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind:?} generation error: {message}")]
pub struct GenerationError {
    pub kind: GenerationErrorKind,
    pub message: String,
}

impl GenerationError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: GenerationErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: GenerationErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn timeout() -> Self {
        Self::transient("draft generation timed out")
    }

    pub fn is_transient(&self) -> bool {
        self.kind == GenerationErrorKind::Transient
    }
}

/// Everything a generator gets to see: the full current claim plus the ordered transcript.
#[derive(Debug, Clone, Serialize)]
pub struct DraftRequest {
    pub claim_id: ClaimId,
    pub claim_type: ClaimType,
    pub form: ClaimFormData,
    pub transcript: Vec<ChatMessage>,
    pub report: ValidationReport,
}

/// External capability that turns a claim and its conversation into a draft document.
#[async_trait]
pub trait DraftGenerator: Send + Sync {
    async fn generate(
        &self,
        request: &DraftRequest,
    ) -> std::result::Result<DraftPayload, GenerationError>;
}
