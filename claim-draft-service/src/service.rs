use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, patch, post},
};
use claim_draft::{
    ChatMessage, Claim, ClaimField, ClaimId, ClaimStore, ClaimType, DraftError, DraftGenerator,
    DraftingSession, DraftingSessions, FormSection, PhotoRef, SessionSnapshot, ValidationError,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "claim_id": id
        })),
    )
}

/// Map engine errors onto HTTP responses.
fn draft_error(e: DraftError) -> ApiError {
    let status = match &e {
        DraftError::Validation(_) | DraftError::NotEligible { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        DraftError::Concurrency { .. } | DraftError::StaleRequest => StatusCode::CONFLICT,
        DraftError::Generation(g) if g.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
        DraftError::Generation(_) => StatusCode::BAD_GATEWAY,
        DraftError::SessionClosed(_) => StatusCode::GONE,
        DraftError::NotFound(_) => StatusCode::NOT_FOUND,
        DraftError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!(error = %e, "Request failed");
    } else {
        warn!(error = %e, "Request rejected");
    }

    let mut body = json!({
        "error": e.to_string(),
        "retryable": e.is_retryable(),
    });
    match &e {
        DraftError::NotEligible { missing } => body["missing"] = json!(missing),
        DraftError::Validation(v) => body["field"] = json!(v.field()),
        _ => {}
    }
    (status, Json(body))
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<DraftingSessions>,
    pub store: Arc<dyn ClaimStore>,
    pub generator: Arc<dyn DraftGenerator>,
}

#[derive(Debug, Deserialize)]
pub struct CreateClaimRequest {
    #[serde(alias = "claimType")]
    pub claim_type: ClaimType,
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateClaimRequest {
    #[serde(default, alias = "claimType")]
    pub claim_type: Option<ClaimType>,
    #[serde(default, alias = "currentSection")]
    pub current_section: Option<FormSection>,
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub content: String,
}

pub fn create_app(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/claims", post(create_claim))
        .route("/claims/{id}", get(get_claim).delete(end_session))
        .route("/claims/{id}/open", post(open_claim))
        .route("/claims/{id}/fields", patch(update_claim))
        .route("/claims/{id}/photos", post(attach_photo))
        .route("/claims/{id}/messages", post(post_message))
        .route("/claims/{id}/draft", post(request_draft))
        .route("/claims/{id}/commit", post(commit_claim))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Claim Drafting Service",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "POST /claims": "Start drafting a new claim",
            "POST /claims/{id}/open": "Resume drafting a stored claim",
            "GET /claims/{id}": "Claim fields, progress, draft status and transcript",
            "PATCH /claims/{id}/fields": "Edit claim fields",
            "POST /claims/{id}/photos": "Attach an uploaded photo",
            "POST /claims/{id}/messages": "Add a user message to the conversation",
            "POST /claims/{id}/draft": "Generate a claim draft",
            "POST /claims/{id}/commit": "Save the claim",
            "DELETE /claims/{id}": "End the drafting session",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

fn parse_claim_id(raw: &str) -> Result<ClaimId, ApiError> {
    raw.parse()
        .map_err(|_| bad_request_error("Invalid claim ID format"))
}

/// Resolve field names and reject fields that cannot be typed, before anything is applied.
fn parse_fields(fields: HashMap<String, String>) -> Result<Vec<(ClaimField, String)>, ApiError> {
    fields
        .into_iter()
        .map(|(name, value)| {
            let field = name
                .parse::<ClaimField>()
                .map_err(|e| draft_error(e.into()))?;
            if !field.is_text() {
                return Err(draft_error(
                    ValidationError::invalid_format(
                        field,
                        "photos are attached as references, not typed",
                    )
                    .into(),
                ));
            }
            Ok((field, value))
        })
        .collect()
}

fn find_session(state: &AppState, raw_id: &str) -> Result<Arc<DraftingSession>, ApiError> {
    let claim_id = parse_claim_id(raw_id)?;
    state
        .sessions
        .get(&claim_id)
        .ok_or_else(|| not_found_error("No drafting session for claim", raw_id))
}

async fn create_claim(
    State(state): State<AppState>,
    Json(request): Json<CreateClaimRequest>,
) -> Result<(StatusCode, Json<SessionSnapshot>), ApiError> {
    let edits = parse_fields(request.fields)?;
    let session = state.sessions.open_new(request.claim_type);

    info!(
        claim_id = %session.claim_id(),
        claim_type = %request.claim_type,
        "Created claim drafting session"
    );

    if !edits.is_empty() {
        if let Err(e) = session.update_fields(edits).await {
            state.sessions.end(&session.claim_id()).await;
            return Err(draft_error(e));
        }
    }
    Ok((StatusCode::CREATED, Json(session.snapshot().await)))
}

async fn open_claim(
    State(state): State<AppState>,
    Path(claim_id): Path<String>,
) -> ApiResult<SessionSnapshot> {
    let id = parse_claim_id(&claim_id)?;
    let session = state
        .sessions
        .open_stored(state.store.as_ref(), &id)
        .await
        .map_err(draft_error)?;
    Ok(Json(session.snapshot().await))
}

async fn get_claim(
    State(state): State<AppState>,
    Path(claim_id): Path<String>,
) -> ApiResult<SessionSnapshot> {
    let session = find_session(&state, &claim_id)?;
    Ok(Json(session.snapshot().await))
}

async fn update_claim(
    State(state): State<AppState>,
    Path(claim_id): Path<String>,
    Json(request): Json<UpdateClaimRequest>,
) -> ApiResult<SessionSnapshot> {
    let session = find_session(&state, &claim_id)?;
    let edits = parse_fields(request.fields)?;

    if let Some(claim_type) = request.claim_type {
        session.set_claim_type(claim_type).await.map_err(draft_error)?;
    }
    if let Some(section) = request.current_section {
        session.set_section(section).await.map_err(draft_error)?;
    }
    if !edits.is_empty() {
        session.update_fields(edits).await.map_err(draft_error)?;
    }
    Ok(Json(session.snapshot().await))
}

async fn attach_photo(
    State(state): State<AppState>,
    Path(claim_id): Path<String>,
    Json(photo): Json<PhotoRef>,
) -> ApiResult<SessionSnapshot> {
    let session = find_session(&state, &claim_id)?;
    session.attach_photo(photo).await.map_err(draft_error)?;
    Ok(Json(session.snapshot().await))
}

async fn post_message(
    State(state): State<AppState>,
    Path(claim_id): Path<String>,
    Json(request): Json<MessageRequest>,
) -> ApiResult<ChatMessage> {
    let session = find_session(&state, &claim_id)?;
    let message = session
        .append_user_message(request.content)
        .await
        .map_err(draft_error)?;
    Ok(Json(message))
}

async fn request_draft(
    State(state): State<AppState>,
    Path(claim_id): Path<String>,
) -> ApiResult<ChatMessage> {
    let session = find_session(&state, &claim_id)?;
    let timeout = state.sessions.config().generation_timeout;
    let message = session
        .request_draft(state.generator.as_ref(), timeout)
        .await
        .map_err(draft_error)?;

    info!(claim_id = %claim_id, message_id = %message.id, "Draft generated");
    Ok(Json(message))
}

async fn commit_claim(
    State(state): State<AppState>,
    Path(claim_id): Path<String>,
) -> ApiResult<Claim> {
    let session = find_session(&state, &claim_id)?;
    let claim = session
        .commit(state.store.as_ref())
        .await
        .map_err(draft_error)?;
    Ok(Json(claim))
}

async fn end_session(
    State(state): State<AppState>,
    Path(claim_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_claim_id(&claim_id)?;
    if state.sessions.end(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found_error("No drafting session for claim", &claim_id))
    }
}
