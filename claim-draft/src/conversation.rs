//! Conversation Manager: the per-claim transcript and folding drafts back into the form.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::claim::{ClaimField, ClaimFormData, ClaimId};
use crate::error::ValidationError;
use crate::message::{ChatMessage, ClaimDraft, DraftId};

const DEFAULT_DRAFT_MESSAGE: &str = "I've prepared a draft of your claim.";

/// Who last wrote a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum FieldSource {
    Human,
    Draft { draft_id: DraftId },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Provenance {
    sources: HashMap<ClaimField, FieldSource>,
}

impl Provenance {
    pub fn record_human(&mut self, field: ClaimField) {
        self.sources.insert(field, FieldSource::Human);
    }

    pub fn source(&self, field: ClaimField) -> Option<FieldSource> {
        self.sources.get(&field).copied()
    }

    pub fn is_human(&self, field: ClaimField) -> bool {
        self.source(field) == Some(FieldSource::Human)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotMarkedOverwrite,
    HumanEdited,
    NotMergeable,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub applied: Vec<ClaimField>,
    pub skipped: Vec<(ClaimField, SkipReason)>,
}

/// Apply a draft's suggested values. Last human edit wins: a field the user wrote is never
/// replaced, and only suggestions explicitly marked `overwrite` are considered at all.
pub fn merge_draft(
    form: &mut ClaimFormData,
    provenance: &mut Provenance,
    draft: &ClaimDraft,
) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();

    for suggestion in draft.fields() {
        let field = suggestion.field;
        let skip = if !field.is_text() {
            Some(SkipReason::NotMergeable)
        } else if !suggestion.overwrite {
            Some(SkipReason::NotMarkedOverwrite)
        } else if provenance.is_human(field) {
            Some(SkipReason::HumanEdited)
        } else {
            None
        };

        if let Some(reason) = skip {
            debug!(draft_id = %draft.id(), %field, ?reason, "Skipping draft field");
            outcome.skipped.push((field, reason));
            continue;
        }

        if form.set_text(field, suggestion.value.clone()).is_ok() {
            provenance.sources.insert(
                field,
                FieldSource::Draft {
                    draft_id: draft.id(),
                },
            );
            outcome.applied.push(field);
        }
    }

    info!(
        draft_id = %draft.id(),
        applied = outcome.applied.len(),
        skipped = outcome.skipped.len(),
        "Merged draft into claim"
    );
    outcome
}

/// Ordered, append-only transcript for one claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    claim_id: ClaimId,
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(claim_id: ClaimId) -> Self {
        Self {
            claim_id,
            messages: Vec::new(),
        }
    }

    pub fn claim_id(&self) -> ClaimId {
        self.claim_id
    }

    pub fn append_user_message(
        &mut self,
        content: impl Into<String>,
    ) -> Result<ChatMessage, ValidationError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        Ok(self.push(ChatMessage::user(content)))
    }

    pub fn append_assistant_message(
        &mut self,
        content: impl Into<String>,
    ) -> Result<ChatMessage, ValidationError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        Ok(self.push(ChatMessage::assistant(content)))
    }

    /// Record a successful draft as its own assistant turn.
    pub fn append_draft(&mut self, content: Option<String>, draft: ClaimDraft) -> ChatMessage {
        let content = content
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DRAFT_MESSAGE.to_string());
        self.push(ChatMessage::assistant_with_draft(content, draft))
    }

    fn push(&mut self, mut message: ChatMessage) -> ChatMessage {
        // keep timestamp order even if the wall clock steps back
        if let Some(last) = self.messages.last() {
            if message.timestamp < last.timestamp {
                message.timestamp = last.timestamp;
            }
        }
        debug!(
            claim_id = %self.claim_id,
            message_id = %message.id,
            role = ?message.role,
            "Appended chat message"
        );
        self.messages.push(message.clone());
        message
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last_messages(&self, n: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn drafts(&self) -> impl Iterator<Item = &ClaimDraft> {
        self.messages.iter().filter_map(ChatMessage::draft)
    }

    pub fn latest_draft(&self) -> Option<&ClaimDraft> {
        self.messages.iter().rev().find_map(ChatMessage::draft)
    }
}
