use async_trait::async_trait;
use claim_draft::{
    Claim, ClaimField, ClaimFormData, ClaimId, ClaimStore, ClaimType, DraftError, DraftField, DraftGenerator,
    DraftOutcome, DraftPayload, DraftRequest, DraftingSession, DraftingSessions, FieldRules,
    GateState, GenerationError, MessageRole, PhotoRef, SkipReason,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Generator that blocks until released, so tests can act while a request is in flight.
struct GatedGenerator {
    started: Notify,
    release: Notify,
    calls: AtomicUsize,
    seen: Mutex<Option<DraftRequest>>,
    payload: DraftPayload,
}

impl GatedGenerator {
    fn new(payload: DraftPayload) -> Arc<Self> {
        Arc::new(Self {
            started: Notify::new(),
            release: Notify::new(),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(None),
            payload,
        })
    }
}

#[async_trait]
impl DraftGenerator for GatedGenerator {
    async fn generate(&self, request: &DraftRequest) -> Result<DraftPayload, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.seen.lock().await = Some(request.clone());
        self.started.notify_one();
        self.release.notified().await;
        Ok(self.payload.clone())
    }
}

struct FailingGenerator(GenerationError);

#[async_trait]
impl DraftGenerator for FailingGenerator {
    async fn generate(&self, _request: &DraftRequest) -> Result<DraftPayload, GenerationError> {
        Err(self.0.clone())
    }
}

struct SlowGenerator;

#[async_trait]
impl DraftGenerator for SlowGenerator {
    async fn generate(&self, _request: &DraftRequest) -> Result<DraftPayload, GenerationError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(payload(vec![]))
    }
}

struct UnavailableStore;

#[async_trait]
impl ClaimStore for UnavailableStore {
    async fn load(&self, id: &ClaimId) -> claim_draft::Result<Claim> {
        Err(DraftError::NotFound(*id))
    }

    async fn save(&self, _claim: Claim) -> claim_draft::Result<Claim> {
        Err(DraftError::Persistence("connection refused".to_string()))
    }
}

fn payload(fields: Vec<DraftField>) -> DraftPayload {
    DraftPayload {
        document: "On March 9 a kitchen fire damaged the property at 12 Elm St.".to_string(),
        message: Some("Here is a first draft of your claim.".to_string()),
        fields,
    }
}

fn overwrite(field: ClaimField, value: &str) -> DraftField {
    DraftField {
        field,
        value: value.to_string(),
        overwrite: true,
    }
}

async fn eligible_property_session() -> Arc<DraftingSession> {
    let sessions = DraftingSessions::default();
    let session = sessions.open_new(ClaimType::Property);
    session
        .update_fields([
            (ClaimField::AddressOfLoss, "12 Elm St".to_string()),
            (ClaimField::City, "Springfield".to_string()),
            (ClaimField::State, "IL".to_string()),
            (ClaimField::ZipCode, "62701".to_string()),
        ])
        .await
        .unwrap();
    session
}

#[tokio::test]
async fn property_claim_with_only_address_is_a_quarter_done() {
    let sessions = DraftingSessions::default();
    let session = sessions.open_new(ClaimType::Property);

    session
        .update_field(ClaimField::AddressOfLoss, "12 Elm St")
        .await
        .unwrap();

    assert_eq!(session.progress().await, 25);
    assert_eq!(session.gate_state().await, GateState::Idle);

    let err = session
        .request_draft(&FailingGenerator(GenerationError::timeout()), TIMEOUT)
        .await
        .unwrap_err();
    match err {
        DraftError::NotEligible { missing } => assert_eq!(
            missing,
            vec![ClaimField::City, ClaimField::State, ClaimField::ZipCode]
        ),
        other => panic!("expected NotEligible, got {other:?}"),
    }
}

#[tokio::test]
async fn completing_property_fields_makes_claim_eligible() {
    let session = eligible_property_session().await;
    assert_eq!(session.progress().await, 100);
    assert_eq!(session.gate_state().await, GateState::Eligible);

    // breaking a required field drops back to idle
    session.update_field(ClaimField::ZipCode, "6270").await.unwrap();
    assert_eq!(session.gate_state().await, GateState::Idle);
    assert_eq!(session.progress().await, 75);
}

#[tokio::test]
async fn second_request_while_in_flight_is_rejected() {
    let session = eligible_property_session().await;
    let generator = GatedGenerator::new(payload(vec![]));

    let first = {
        let session = session.clone();
        let generator = generator.clone();
        tokio::spawn(async move { session.request_draft(generator.as_ref(), TIMEOUT).await })
    };
    generator.started.notified().await;
    assert!(session.gate_state().await.is_requesting());

    let second = session.request_draft(generator.as_ref(), TIMEOUT).await;
    assert!(matches!(second, Err(DraftError::Concurrency { .. })));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

    generator.release.notify_one();
    let message = first.await.unwrap().unwrap();
    assert!(message.draft().is_some());
    assert_eq!(session.gate_state().await, GateState::Eligible);
    assert_eq!(session.transcript().await.len(), 1);
}

#[tokio::test]
async fn timeout_fails_without_transcript_entry_or_field_changes() {
    let session = eligible_property_session().await;
    session
        .append_user_message("Please draft my claim")
        .await
        .unwrap();
    let form_before = session.form().await;

    let err = session
        .request_draft(&SlowGenerator, Duration::from_millis(20))
        .await
        .unwrap_err();

    assert!(matches!(&err, DraftError::Generation(e) if e.is_transient()));
    assert!(err.is_retryable());

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.gate, GateState::Eligible);
    assert!(matches!(
        snapshot.last_outcome,
        Some(DraftOutcome::Failed { .. })
    ));
    assert_eq!(snapshot.transcript.len(), 1);
    assert!(snapshot.transcript.iter().all(|m| m.draft().is_none()));
    assert_eq!(snapshot.form, form_before);
    assert!(snapshot.retry_warning.is_none());
}

#[tokio::test]
async fn retry_after_failure_is_allowed() {
    let session = eligible_property_session().await;
    let _ = session
        .request_draft(
            &FailingGenerator(GenerationError::transient("503 from provider")),
            TIMEOUT,
        )
        .await;

    let generator = GatedGenerator::new(payload(vec![]));
    generator.release.notify_one();
    let message = session
        .request_draft(generator.as_ref(), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(message.role, MessageRole::Assistant);
}

#[tokio::test]
async fn permanent_failure_sets_retry_warning_until_next_edit() {
    let session = eligible_property_session().await;
    let err = session
        .request_draft(
            &FailingGenerator(GenerationError::permanent("response was not valid JSON")),
            TIMEOUT,
        )
        .await
        .unwrap_err();
    assert!(!err.is_retryable());

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.gate, GateState::Eligible);
    assert!(snapshot.retry_warning.is_some());

    session
        .update_field(ClaimField::InternalNotes, "adjuster visit booked")
        .await
        .unwrap();
    assert!(session.snapshot().await.retry_warning.is_none());
}

#[tokio::test]
async fn edits_during_request_win_over_draft() {
    let session = eligible_property_session().await;
    let generator = GatedGenerator::new(payload(vec![
        overwrite(ClaimField::City, "Capital City"),
        overwrite(ClaimField::ClientName, "Homer Simpson"),
        DraftField {
            field: ClaimField::CarrierName,
            value: "Acme Mutual".to_string(),
            overwrite: false,
        },
    ]));

    let pending = {
        let session = session.clone();
        let generator = generator.clone();
        tokio::spawn(async move { session.request_draft(generator.as_ref(), TIMEOUT).await })
    };
    generator.started.notified().await;

    // edits and progress reads proceed while the draft is being generated
    session
        .update_field(ClaimField::City, "Shelbyville")
        .await
        .unwrap();
    assert_eq!(session.progress().await, 100);

    generator.release.notify_one();
    pending.await.unwrap().unwrap();

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.form.city, "Shelbyville");
    assert_eq!(snapshot.form.client_name, "Homer Simpson");
    assert_eq!(snapshot.form.carrier_name, "");

    let merge = snapshot.last_merge.unwrap();
    assert_eq!(merge.applied, vec![ClaimField::ClientName]);
    assert!(merge
        .skipped
        .contains(&(ClaimField::City, SkipReason::HumanEdited)));
    assert!(merge
        .skipped
        .contains(&(ClaimField::CarrierName, SkipReason::NotMarkedOverwrite)));
}

#[tokio::test]
async fn dropped_request_does_not_block_the_next_one() {
    let session = eligible_property_session().await;
    let stuck = GatedGenerator::new(payload(vec![]));

    let pending = {
        let session = session.clone();
        let generator = stuck.clone();
        tokio::spawn(async move { session.request_draft(generator.as_ref(), TIMEOUT).await })
    };
    stuck.started.notified().await;
    assert!(session.gate_state().await.is_requesting());

    // the caller goes away, e.g. the client disconnected
    pending.abort();
    assert!(pending.await.unwrap_err().is_cancelled());

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.gate, GateState::Eligible);
    assert!(matches!(
        snapshot.last_outcome,
        Some(DraftOutcome::Failed { ref error, .. }) if error.is_transient()
    ));
    assert!(snapshot.transcript.is_empty());

    let ready = GatedGenerator::new(payload(vec![]));
    ready.release.notify_one();
    let message = session.request_draft(ready.as_ref(), TIMEOUT).await.unwrap();
    assert!(message.draft().is_some());
    assert_eq!(session.gate_state().await, GateState::Eligible);
}

#[tokio::test]
async fn prefilled_form_values_are_not_overwritten_by_drafts() {
    let sessions = DraftingSessions::default();
    let mut form = ClaimFormData::new(ClaimType::Other);
    form.set_text(ClaimField::ClientName, "Dana Reyes").unwrap();
    form.set_text(ClaimField::City, "Shelbyville").unwrap();
    let session = sessions.open(form);
    assert_eq!(session.gate_state().await, GateState::Eligible);

    let generator = GatedGenerator::new(payload(vec![
        overwrite(ClaimField::City, "Springfield"),
        overwrite(ClaimField::State, "IL"),
    ]));
    generator.release.notify_one();
    session
        .request_draft(generator.as_ref(), TIMEOUT)
        .await
        .unwrap();

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.form.city, "Shelbyville");
    assert_eq!(snapshot.form.state, "IL");

    let merge = snapshot.last_merge.unwrap();
    assert_eq!(merge.applied, vec![ClaimField::State]);
    assert!(merge
        .skipped
        .contains(&(ClaimField::City, SkipReason::HumanEdited)));
}

#[tokio::test]
async fn generator_sees_full_claim_and_transcript() {
    let session = eligible_property_session().await;
    session
        .append_user_message("The fire started in the kitchen")
        .await
        .unwrap();
    let generator = GatedGenerator::new(payload(vec![]));
    generator.release.notify_one();

    session
        .request_draft(generator.as_ref(), TIMEOUT)
        .await
        .unwrap();

    let seen = generator.seen.lock().await.clone().unwrap();
    assert_eq!(seen.claim_id, session.claim_id());
    assert_eq!(seen.claim_type, ClaimType::Property);
    assert_eq!(seen.form.address_of_loss, "12 Elm St");
    assert_eq!(seen.transcript.len(), 1);
    assert!(seen.report.is_complete);
}

#[tokio::test]
async fn result_after_session_end_is_discarded() {
    let sessions = DraftingSessions::default();
    let session = sessions.open_new(ClaimType::Other);
    session
        .update_field(ClaimField::ClientName, "Dana Reyes")
        .await
        .unwrap();
    let generator = GatedGenerator::new(payload(vec![overwrite(
        ClaimField::SpecialInstructions,
        "call first",
    )]));

    let pending = {
        let session = session.clone();
        let generator = generator.clone();
        tokio::spawn(async move { session.request_draft(generator.as_ref(), TIMEOUT).await })
    };
    generator.started.notified().await;

    assert!(sessions.end(&session.claim_id()).await);
    generator.release.notify_one();

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(DraftError::StaleRequest)));

    let snapshot = session.snapshot().await;
    assert!(snapshot.transcript.is_empty());
    assert_eq!(snapshot.form.special_instructions, "");
    assert!(matches!(
        snapshot.last_outcome,
        Some(DraftOutcome::Abandoned { .. })
    ));
    assert!(matches!(
        session.update_field(ClaimField::City, "Springfield").await,
        Err(DraftError::SessionClosed(_))
    ));
}

#[tokio::test]
async fn only_assistant_messages_carry_drafts() {
    let session = eligible_property_session().await;
    let generator = GatedGenerator::new(payload(vec![]));

    for turn in ["first draft please", "mention the smoke damage"] {
        session.append_user_message(turn).await.unwrap();
        generator.release.notify_one();
        session
            .request_draft(generator.as_ref(), TIMEOUT)
            .await
            .unwrap();
    }

    let transcript = session.transcript().await;
    assert_eq!(transcript.len(), 4);
    for message in &transcript {
        match message.role {
            MessageRole::User => assert!(message.draft().is_none()),
            MessageRole::Assistant => assert!(message.draft().is_some()),
        }
    }
    assert!(transcript.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    let first = transcript[1].draft().unwrap();
    let second = transcript[3].draft().unwrap();
    assert_ne!(first.id(), second.id());
    assert_ne!(first.request_id(), second.request_id());
}

#[tokio::test]
async fn failed_commit_keeps_edits() {
    let session = eligible_property_session().await;
    let before = session.form().await;

    let err = session.commit(&UnavailableStore).await.unwrap_err();
    assert!(matches!(err, DraftError::Persistence(_)));
    assert!(err.is_retryable());
    assert_eq!(session.form().await, before);
}

#[tokio::test]
async fn claim_type_change_reevaluates_gate() {
    let session = eligible_property_session().await;
    assert_eq!(session.gate_state().await, GateState::Eligible);

    session.set_claim_type(ClaimType::Fire).await.unwrap();
    assert_eq!(session.gate_state().await, GateState::Idle);
    // 4 of 6: policy number and photos outstanding
    assert_eq!(session.progress().await, 67);

    session
        .update_field(ClaimField::PolicyNumber, "FP-1001")
        .await
        .unwrap();
    session
        .attach_photo(PhotoRef::new("https://img.example/kitchen.jpg"))
        .await
        .unwrap();
    assert_eq!(session.gate_state().await, GateState::Eligible);

    session.remove_photo(0).await.unwrap();
    assert_eq!(session.gate_state().await, GateState::Idle);
    assert!(session.remove_photo(3).await.is_err());
}

#[tokio::test]
async fn type_without_requirements_is_immediately_eligible() {
    let sessions = DraftingSessions::new(claim_draft::DraftConfig {
        rules: FieldRules::default().require(ClaimType::Other, []),
        ..Default::default()
    });
    let session = sessions.open_new(ClaimType::Other);

    assert_eq!(session.progress().await, 100);
    assert_eq!(session.gate_state().await, GateState::Eligible);
}
