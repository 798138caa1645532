use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use tracing::info;

use crate::claim::{Claim, ClaimId};
use crate::error::{DraftError, Result};
use crate::storage::ClaimStore;

const CREATE_CLAIMS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS claims (
    id UUID PRIMARY KEY,
    claim_type TEXT NOT NULL,
    data JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
)
"#;

/// Claims persisted as JSONB rows in PostgreSQL.
pub struct PostgresClaimStore {
    pool: PgPool,
}

impl PostgresClaimStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(persistence)?;

        sqlx::query(CREATE_CLAIMS_TABLE)
            .execute(&pool)
            .await
            .map_err(persistence)?;

        info!("Connected to PostgreSQL claim store");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn persistence(e: sqlx::Error) -> DraftError {
    DraftError::Persistence(e.to_string())
}

#[async_trait]
impl ClaimStore for PostgresClaimStore {
    async fn load(&self, id: &ClaimId) -> Result<Claim> {
        let row: Option<(Json<Claim>,)> = sqlx::query_as("SELECT data FROM claims WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(persistence)?;

        row.map(|(Json(claim),)| claim)
            .ok_or(DraftError::NotFound(*id))
    }

    async fn save(&self, claim: Claim) -> Result<Claim> {
        sqlx::query(
            r#"
            INSERT INTO claims (id, claim_type, data, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET claim_type = EXCLUDED.claim_type,
                data = EXCLUDED.data,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(*claim.id.as_uuid())
        .bind(claim.claim_type.as_str())
        .bind(Json(&claim))
        .bind(claim.updated_at)
        .execute(&self.pool)
        .await
        .map_err(persistence)?;

        Ok(claim)
    }
}
