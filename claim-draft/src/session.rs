//! Per-claim drafting session: the form being authored, its gate and its transcript.
//!
//! A session is shared as `Arc<DraftingSession>`. Its state sits behind an async mutex that
//! is released for the duration of a generator call, so the claim can be edited and its
//! progress read while a draft is being produced.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::claim::{Claim, ClaimField, ClaimFormData, ClaimId, ClaimType, FormSection, PhotoRef};
use crate::conversation::{Conversation, MergeOutcome, Provenance, merge_draft};
use crate::error::{DraftError, Result, ValidationError};
use crate::gate::{DraftGate, DraftOutcome, GateState, RequestId};
use crate::generator::{DraftGenerator, DraftRequest, GenerationError};
use crate::message::{ChatMessage, ClaimDraft};
use crate::progress::progress_from_report;
use crate::storage::ClaimStore;
use crate::validator::{FieldRules, SectionProgress, ValidationReport, validate};

const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct DraftConfig {
    pub generation_timeout: Duration,
    pub rules: FieldRules,
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self {
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            rules: FieldRules::default(),
        }
    }
}

/// Read-only view of a session handed to callers.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub claim_id: ClaimId,
    pub form: ClaimFormData,
    pub report: ValidationReport,
    pub errors: Vec<String>,
    pub progress: u8,
    pub sections: Vec<(FormSection, SectionProgress)>,
    pub gate: GateState,
    pub last_outcome: Option<DraftOutcome>,
    pub retry_warning: Option<GenerationError>,
    pub last_merge: Option<MergeOutcome>,
    pub transcript: Vec<ChatMessage>,
}

struct SessionState {
    form: ClaimFormData,
    provenance: Provenance,
    report: ValidationReport,
    gate: DraftGate,
    conversation: Conversation,
    last_merge: Option<MergeOutcome>,
    closed: bool,
}

impl SessionState {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(DraftError::SessionClosed(self.form.id))
        } else {
            Ok(())
        }
    }

    fn refresh(&mut self, rules: &FieldRules) -> ValidationReport {
        self.report = validate(&self.form, rules);
        self.gate.evaluate(&self.report);
        self.report.clone()
    }
}

pub struct DraftingSession {
    claim_id: ClaimId,
    rules: FieldRules,
    state: Arc<Mutex<SessionState>>,
}

impl DraftingSession {
    /// Open a session on `form`. Values already in the form count as human-supplied.
    pub fn new(form: ClaimFormData, rules: FieldRules) -> Self {
        let claim_id = form.id;
        let mut provenance = Provenance::default();
        for field in ClaimField::ALL.into_iter().filter(|f| form.is_present(*f)) {
            provenance.record_human(field);
        }
        let report = validate(&form, &rules);
        let mut gate = DraftGate::new(claim_id);
        gate.evaluate(&report);

        info!(
            claim_id = %claim_id,
            claim_type = %form.claim_type,
            progress = progress_from_report(&report),
            "Opened drafting session"
        );

        Self {
            claim_id,
            rules,
            state: Arc::new(Mutex::new(SessionState {
                form,
                provenance,
                report,
                gate,
                conversation: Conversation::new(claim_id),
                last_merge: None,
                closed: false,
            })),
        }
    }

    /// Resume authoring a stored claim.
    pub fn from_claim(claim: &Claim, rules: FieldRules) -> Self {
        Self::new(ClaimFormData::from_claim(claim), rules)
    }

    pub fn claim_id(&self) -> ClaimId {
        self.claim_id
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        SessionSnapshot {
            claim_id: self.claim_id,
            form: state.form.clone(),
            report: state.report.clone(),
            errors: state.report.errors().iter().map(ToString::to_string).collect(),
            progress: progress_from_report(&state.report),
            sections: FormSection::ALL
                .into_iter()
                .map(|s| (s, state.report.section_progress(s)))
                .collect(),
            gate: state.gate.state(),
            last_outcome: state.gate.last_outcome().cloned(),
            retry_warning: state.gate.retry_warning().cloned(),
            last_merge: state.last_merge.clone(),
            transcript: state.conversation.messages().to_vec(),
        }
    }

    pub async fn form(&self) -> ClaimFormData {
        self.state.lock().await.form.clone()
    }

    pub async fn report(&self) -> ValidationReport {
        self.state.lock().await.report.clone()
    }

    pub async fn progress(&self) -> u8 {
        progress_from_report(&self.state.lock().await.report)
    }

    pub async fn gate_state(&self) -> GateState {
        self.state.lock().await.gate.state()
    }

    pub async fn transcript(&self) -> Vec<ChatMessage> {
        self.state.lock().await.conversation.messages().to_vec()
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    /// Human edit of a single text field.
    pub async fn update_field(
        &self,
        field: ClaimField,
        value: impl Into<String>,
    ) -> Result<ValidationReport> {
        self.update_fields([(field, value.into())]).await
    }

    /// Human edit of several text fields; nothing is applied if any field is not editable.
    pub async fn update_fields(
        &self,
        edits: impl IntoIterator<Item = (ClaimField, String)>,
    ) -> Result<ValidationReport> {
        let edits: Vec<_> = edits.into_iter().collect();
        if let Some((field, _)) = edits.iter().find(|(f, _)| !f.is_text()) {
            return Err(ValidationError::invalid_format(
                *field,
                "photos are attached as references, not typed",
            )
            .into());
        }

        let mut state = self.state.lock().await;
        state.ensure_open()?;
        for (field, value) in edits {
            state.form.set_text(field, value)?;
            state.provenance.record_human(field);
        }
        state.gate.note_human_edit();
        Ok(state.refresh(&self.rules))
    }

    pub async fn set_claim_type(&self, claim_type: ClaimType) -> Result<ValidationReport> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;
        if state.form.claim_type != claim_type {
            info!(
                claim_id = %self.claim_id,
                from = %state.form.claim_type,
                to = %claim_type,
                "Claim type changed"
            );
            state.form.claim_type = claim_type;
            state.gate.note_human_edit();
        }
        Ok(state.refresh(&self.rules))
    }

    /// UI-only; not an edit of the claim.
    pub async fn set_section(&self, section: FormSection) -> Result<()> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;
        state.form.current_section = section;
        Ok(())
    }

    pub async fn attach_photo(&self, photo: PhotoRef) -> Result<ValidationReport> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;
        state.form.photos.push(photo);
        state.provenance.record_human(ClaimField::Photos);
        state.gate.note_human_edit();
        Ok(state.refresh(&self.rules))
    }

    pub async fn remove_photo(&self, index: usize) -> Result<ValidationReport> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;
        if index >= state.form.photos.len() {
            return Err(ValidationError::invalid_format(
                ClaimField::Photos,
                format!("no photo at position {index}"),
            )
            .into());
        }
        state.form.photos.remove(index);
        state.provenance.record_human(ClaimField::Photos);
        state.gate.note_human_edit();
        Ok(state.refresh(&self.rules))
    }

    pub async fn append_user_message(&self, content: impl Into<String>) -> Result<ChatMessage> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;
        Ok(state.conversation.append_user_message(content)?)
    }

    /// Ask `generator` for a draft of the claim as it stands now.
    ///
    /// Rejected with [`DraftError::Concurrency`] while another request is in flight. The
    /// generator is given at most `timeout`; expiry is handled like any transient failure.
    /// A result arriving after the session ended, or after its request was abandoned, is
    /// discarded with [`DraftError::StaleRequest`].
    pub async fn request_draft(
        &self,
        generator: &dyn DraftGenerator,
        timeout: Duration,
    ) -> Result<ChatMessage> {
        let (request_id, request) = {
            let mut state = self.state.lock().await;
            state.ensure_open()?;
            let request_id = state.gate.begin_request()?;
            let request = DraftRequest {
                claim_id: self.claim_id,
                claim_type: state.form.claim_type,
                form: state.form.clone(),
                transcript: state.conversation.messages().to_vec(),
                report: state.report.clone(),
            };
            (request_id, request)
        };

        info!(
            claim_id = %self.claim_id,
            request_id = %request_id,
            transcript_len = request.transcript.len(),
            timeout = ?timeout,
            "Requesting claim draft"
        );

        let mut in_flight = InFlightRequest {
            state: Arc::clone(&self.state),
            claim_id: self.claim_id,
            request_id,
            settled: false,
        };

        let result = match tokio::time::timeout(timeout, generator.generate(&request)).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::timeout()),
        };

        let mut guard = self.state.lock().await;
        in_flight.settled = true;
        let state = &mut *guard;
        match result {
            Ok(payload) => {
                if state.gate.in_flight() != Some(request_id) {
                    warn!(
                        claim_id = %self.claim_id,
                        request_id = %request_id,
                        "Discarding draft for a request that is no longer current"
                    );
                    return Err(DraftError::StaleRequest);
                }

                let reply = payload.message.clone();
                let draft = ClaimDraft::seal(self.claim_id, request_id, payload);
                let merged = merge_draft(&mut state.form, &mut state.provenance, &draft);
                let message = state.conversation.append_draft(reply, draft);
                state.last_merge = Some(merged);
                state.refresh(&self.rules);
                state.gate.succeed(request_id)?;
                Ok(message)
            }
            Err(error) => {
                warn!(
                    claim_id = %self.claim_id,
                    request_id = %request_id,
                    error = %error,
                    "Draft generation failed"
                );
                state.gate.fail(request_id, error.clone())?;
                Err(DraftError::Generation(error))
            }
        }
    }

    /// Persist the current form. On failure nothing is lost; the form stays as it was.
    pub async fn commit(&self, store: &dyn ClaimStore) -> Result<Claim> {
        let claim = {
            let state = self.state.lock().await;
            state.ensure_open()?;
            state.form.to_claim()?
        };

        match store.save(claim).await {
            Ok(saved) => {
                info!(claim_id = %self.claim_id, "Committed claim");
                Ok(saved)
            }
            Err(e) => {
                warn!(
                    claim_id = %self.claim_id,
                    error = %e,
                    "Failed to commit claim; edits retained for retry"
                );
                Err(e)
            }
        }
    }

    /// End the session. An in-flight draft request is abandoned and its result discarded.
    pub async fn end(&self) -> Option<RequestId> {
        let mut state = self.state.lock().await;
        if state.closed {
            return None;
        }
        state.closed = true;
        info!(claim_id = %self.claim_id, "Ended drafting session");
        state.gate.abandon()
    }
}

/// Settles the gate of a draft request whose caller went away before the result came back.
struct InFlightRequest {
    state: Arc<Mutex<SessionState>>,
    claim_id: ClaimId,
    request_id: RequestId,
    settled: bool,
}

impl InFlightRequest {
    fn fail_dropped(state: &mut SessionState, claim_id: ClaimId, request_id: RequestId) {
        if state.gate.in_flight() != Some(request_id) {
            return;
        }
        warn!(
            claim_id = %claim_id,
            request_id = %request_id,
            "Draft request dropped before completion"
        );
        let error = GenerationError::transient("draft request dropped before completion");
        if let Err(e) = state.gate.fail(request_id, error) {
            warn!(claim_id = %claim_id, error = %e, "Could not settle dropped draft request");
        }
    }
}

impl Drop for InFlightRequest {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let (claim_id, request_id) = (self.claim_id, self.request_id);
        match self.state.try_lock() {
            Ok(mut state) => Self::fail_dropped(&mut state, claim_id, request_id),
            Err(_) => {
                // Someone holds the lock; settle once it is free.
                let state = Arc::clone(&self.state);
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        let mut state = state.lock().await;
                        Self::fail_dropped(&mut state, claim_id, request_id);
                    });
                }
            }
        }
    }
}
