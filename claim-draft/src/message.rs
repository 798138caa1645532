//! Transcript turns and the drafts attached to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::claim::{ClaimField, ClaimId};
use crate::error::ValidationError;
use crate::gate::RequestId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftId(Uuid);

impl DraftId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DraftId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A field value suggested by a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftField {
    pub field: ClaimField,
    pub value: String,
    /// Only fields marked for overwrite are ever merged into the form.
    #[serde(default)]
    pub overwrite: bool,
}

/// What a generator hands back before it is sealed into a [`ClaimDraft`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftPayload {
    pub document: String,
    /// Assistant reply to show alongside the draft.
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub fields: Vec<DraftField>,
}

/// A generated claim document. Immutable: newer drafts supersede it on their own messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimDraft {
    id: DraftId,
    claim_id: ClaimId,
    request_id: RequestId,
    created_at: DateTime<Utc>,
    document: String,
    fields: Vec<DraftField>,
}

impl ClaimDraft {
    pub(crate) fn seal(claim_id: ClaimId, request_id: RequestId, payload: DraftPayload) -> Self {
        Self {
            id: DraftId::new(),
            claim_id,
            request_id,
            created_at: Utc::now(),
            document: payload.document,
            fields: payload.fields,
        }
    }

    pub fn id(&self) -> DraftId {
        self.id
    }

    pub fn claim_id(&self) -> ClaimId {
        self.claim_id
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn fields(&self) -> &[DraftField] {
        &self.fields
    }
}

/// One conversational turn. Only assistant turns can carry a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ChatMessageRecord")]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    draft: Option<ClaimDraft>,
}

#[derive(Deserialize)]
struct ChatMessageRecord {
    id: MessageId,
    role: MessageRole,
    content: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    draft: Option<ClaimDraft>,
}

impl TryFrom<ChatMessageRecord> for ChatMessage {
    type Error = ValidationError;

    fn try_from(record: ChatMessageRecord) -> Result<Self, Self::Error> {
        if record.role == MessageRole::User && record.draft.is_some() {
            return Err(ValidationError::DraftOnUserMessage);
        }
        Ok(Self {
            id: record.id,
            role: record.role,
            content: record.content,
            timestamp: record.timestamp,
            draft: record.draft,
        })
    }
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::build(MessageRole::User, content.into(), None)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::build(MessageRole::Assistant, content.into(), None)
    }

    pub fn assistant_with_draft(content: impl Into<String>, draft: ClaimDraft) -> Self {
        Self::build(MessageRole::Assistant, content.into(), Some(draft))
    }

    fn build(role: MessageRole, content: String, draft: Option<ClaimDraft>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content,
            timestamp: Utc::now(),
            draft,
        }
    }

    pub fn draft(&self) -> Option<&ClaimDraft> {
        self.draft.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_draft() -> ClaimDraft {
        ClaimDraft::seal(
            ClaimId::new(),
            RequestId::new(),
            DraftPayload {
                document: "Loss of kitchen contents due to fire.".to_string(),
                message: None,
                fields: vec![],
            },
        )
    }

    #[test]
    fn test_user_messages_have_no_draft() {
        let message = ChatMessage::user("My kitchen flooded");
        assert_eq!(message.role, MessageRole::User);
        assert!(message.draft().is_none());
    }

    #[test]
    fn test_assistant_message_carries_draft() {
        let draft = sample_draft();
        let message = ChatMessage::assistant_with_draft("Here is your draft", draft.clone());
        assert_eq!(message.draft(), Some(&draft));
    }

    #[test]
    fn test_message_ids_are_unique() {
        let a = ChatMessage::user("a");
        let b = ChatMessage::user("a");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_serde_keeps_draft_on_assistant_message() {
        let message = ChatMessage::assistant_with_draft("done", sample_draft());
        let json = serde_json::to_value(&message).unwrap();
        let back: ChatMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn test_deserializing_user_message_with_draft_fails() {
        let mut json = serde_json::to_value(ChatMessage::assistant_with_draft(
            "done",
            sample_draft(),
        ))
        .unwrap();
        json["role"] = serde_json::json!("user");

        assert!(serde_json::from_value::<ChatMessage>(json).is_err());
    }

    #[test]
    fn test_payload_defaults() {
        let payload: DraftPayload =
            serde_json::from_str(r#"{"document": "Draft body"}"#).unwrap();
        assert!(payload.message.is_none());
        assert!(payload.fields.is_empty());

        let field: DraftField =
            serde_json::from_str(r#"{"field": "city", "value": "Springfield"}"#).unwrap();
        assert!(!field.overwrite);
    }
}
