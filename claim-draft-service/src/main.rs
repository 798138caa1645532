use anyhow::{Context, Result};
use axum::{
    http::{HeaderValue, Request},
    middleware::{Next, from_fn},
};
use claim_draft::{ClaimStore, DraftConfig, DraftingSessions, InMemoryClaimStore, PostgresClaimStore};
use claim_draft_service::{AppState, RigDraftGenerator, ServiceConfig, create_app};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{Instrument, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Initialize structured JSON tracing based on environment variables
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "claim_draft_service=debug,claim_draft=debug,tower_http=debug".into()
    });

    match log_format.as_str() {
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
    }
}

/// Tags each request with a correlation ID and runs it inside a span carrying it.
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let correlation_id = Uuid::new_v4().to_string();

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

async fn claim_store(config: &ServiceConfig) -> Arc<dyn ClaimStore> {
    let Some(database_url) = config.database_url.as_deref() else {
        info!("Using in-memory claim storage (set DATABASE_URL to use PostgreSQL)");
        return Arc::new(InMemoryClaimStore::new());
    };

    info!("Using PostgreSQL claim storage");
    match PostgresClaimStore::connect(database_url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(
                "Failed to connect to PostgreSQL: {}. Falling back to in-memory storage.",
                e
            );
            Arc::new(InMemoryClaimStore::new())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = ServiceConfig::from_env()?;

    let store = claim_store(&config).await;
    let generator = Arc::new(RigDraftGenerator::new(
        config.openrouter_api_key.clone(),
        config.draft_model.clone(),
    ));
    let sessions = Arc::new(DraftingSessions::new(DraftConfig {
        generation_timeout: config.draft_timeout,
        ..DraftConfig::default()
    }));

    let app_state = AppState {
        sessions,
        store,
        generator,
    };

    let app = create_app(app_state).layer(from_fn(correlation_id_middleware));

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    info!(
        bind_addr = %config.bind_addr,
        model = %config.draft_model,
        timeout_secs = config.draft_timeout.as_secs(),
        "Claim drafting service running"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
