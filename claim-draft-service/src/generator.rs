use async_trait::async_trait;
use claim_draft::{
    ClaimField, DraftField, DraftGenerator, DraftPayload, DraftRequest, GenerationError,
};
use rig::{
    agent::Agent,
    client::CompletionClient,
    completion::Chat,
    providers::openrouter,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::chat_bridge::to_rig_messages;

const CLAIM_DRAFTING_PROMPT: &str = r#"
You are an insurance claims specialist drafting a claim document for a policyholder.

You receive the current claim fields as JSON and the conversation so far. Write a clear,
factual claim narrative using only the information provided. Never invent policy numbers,
dates or amounts.

You may suggest values for claim fields you can infer with confidence from the conversation.
Allowed field names: client_name, carrier_name, policy_number, address_of_loss, city, state,
zip_code, loss_date (YYYY-MM-DD), internal_notes, special_instructions.
Set "overwrite" to true only for fields you are confident should be filled in.

CRITICAL: Respond with ONLY this JSON (no explanation, no additional text):
{
  "document": "the full claim draft",
  "message": "one short sentence to the policyholder about the draft",
  "fields": [
    { "field": "city", "value": "Springfield", "overwrite": true }
  ]
}
"#;

#[derive(Deserialize)]
struct DraftResponse {
    document: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    fields: Vec<SuggestedField>,
}

#[derive(Deserialize)]
struct SuggestedField {
    field: String,
    value: String,
    #[serde(default)]
    overwrite: bool,
}

pub fn get_llm_agent(
    api_key: &str,
    model: &str,
    prompt: &str,
) -> Agent<openrouter::CompletionModel> {
    let client = openrouter::Client::new(api_key);
    client.agent(model).preamble(prompt).build()
}

/// Strip a ```json fence if the model wrapped its answer in one.
fn clean_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

/// Attempts to parse a draft from the LLM response
fn parse_draft_response(raw: &str) -> Result<DraftPayload, GenerationError> {
    let parsed = serde_json::from_str::<DraftResponse>(clean_json(raw)).map_err(|e| {
        GenerationError::permanent(format!(
            "Could not parse draft response: {}. Raw response: {}",
            e, raw
        ))
    })?;

    if parsed.document.trim().is_empty() {
        return Err(GenerationError::permanent("Draft response had an empty document"));
    }

    let fields = parsed
        .fields
        .into_iter()
        .filter_map(|suggested| match suggested.field.parse::<ClaimField>() {
            Ok(field) => Some(DraftField {
                field,
                value: suggested.value,
                overwrite: suggested.overwrite,
            }),
            Err(_) => {
                warn!(field = %suggested.field, "Ignoring unknown field suggested by model");
                None
            }
        })
        .collect();

    Ok(DraftPayload {
        document: parsed.document,
        message: parsed.message,
        fields,
    })
}

/// Draft Generation Client backed by an OpenRouter chat model via rig.
pub struct RigDraftGenerator {
    api_key: String,
    model: String,
}

impl RigDraftGenerator {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl DraftGenerator for RigDraftGenerator {
    async fn generate(&self, request: &DraftRequest) -> Result<DraftPayload, GenerationError> {
        info!(
            claim_id = %request.claim_id,
            model = %self.model,
            transcript_len = request.transcript.len(),
            "Generating claim draft"
        );

        let claim_json = serde_json::to_string_pretty(&request.form)
            .map_err(|e| GenerationError::permanent(format!("Could not encode claim: {}", e)))?;
        let prompt = format!(
            "Claim type: {}\nClaim fields:\n{}\n\nDraft the claim now.",
            request.claim_type, claim_json
        );

        let chat_history = to_rig_messages(&request.transcript);
        let agent = get_llm_agent(&self.api_key, &self.model, CLAIM_DRAFTING_PROMPT);

        let raw = agent
            .chat(prompt.as_str(), chat_history)
            .await
            .map_err(|e| GenerationError::transient(format!("LLM chat failed: {}", e)))?;

        parse_draft_response(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let raw = r#"{"document": "Kitchen fire on 2024-03-09.", "message": "Draft ready",
            "fields": [{"field": "city", "value": "Springfield", "overwrite": true}]}"#;
        let payload = parse_draft_response(raw).unwrap();

        assert_eq!(payload.document, "Kitchen fire on 2024-03-09.");
        assert_eq!(payload.message.as_deref(), Some("Draft ready"));
        assert_eq!(payload.fields.len(), 1);
        assert_eq!(payload.fields[0].field, ClaimField::City);
        assert!(payload.fields[0].overwrite);
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"document\": \"Burst pipe in basement.\"}\n```";
        let payload = parse_draft_response(raw).unwrap();
        assert_eq!(payload.document, "Burst pipe in basement.");
        assert!(payload.fields.is_empty());
    }

    #[test]
    fn test_unknown_fields_are_dropped() {
        let raw = r#"{"document": "d", "fields": [
            {"field": "shoe_size", "value": "10", "overwrite": true},
            {"field": "zipCode", "value": "62701"}
        ]}"#;
        let payload = parse_draft_response(raw).unwrap();
        assert_eq!(payload.fields.len(), 1);
        assert_eq!(payload.fields[0].field, ClaimField::ZipCode);
        assert!(!payload.fields[0].overwrite);
    }

    #[test]
    fn test_malformed_response_is_permanent() {
        let err = parse_draft_response("Sure! Here's your draft: ...").unwrap_err();
        assert!(!err.is_transient());

        let err = parse_draft_response(r#"{"document": "  "}"#).unwrap_err();
        assert!(!err.is_transient());
    }
}
