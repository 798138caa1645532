use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

use crate::claim::{Claim, ClaimFormData, ClaimId, ClaimType};
use crate::error::{DraftError, Result};
use crate::session::{DraftConfig, DraftingSession};

/// Durable home of committed claims.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Fails with [`DraftError::NotFound`] when no claim has this id.
    async fn load(&self, id: &ClaimId) -> Result<Claim>;
    async fn save(&self, claim: Claim) -> Result<Claim>;
}

/// In-memory implementation of ClaimStore
pub struct InMemoryClaimStore {
    claims: Arc<DashMap<ClaimId, Claim>>,
}

impl InMemoryClaimStore {
    pub fn new() -> Self {
        Self {
            claims: Arc::new(DashMap::new()),
        }
    }
}

impl Default for InMemoryClaimStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClaimStore for InMemoryClaimStore {
    async fn load(&self, id: &ClaimId) -> Result<Claim> {
        self.claims
            .get(id)
            .map(|entry| entry.clone())
            .ok_or(DraftError::NotFound(*id))
    }

    async fn save(&self, claim: Claim) -> Result<Claim> {
        self.claims.insert(claim.id, claim.clone());
        Ok(claim)
    }
}

/// Live drafting sessions, one per claim.
pub struct DraftingSessions {
    sessions: Arc<DashMap<ClaimId, Arc<DraftingSession>>>,
    config: DraftConfig,
}

impl DraftingSessions {
    pub fn new(config: DraftConfig) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &DraftConfig {
        &self.config
    }

    /// Start authoring a brand new claim.
    pub fn open_new(&self, claim_type: ClaimType) -> Arc<DraftingSession> {
        self.open(ClaimFormData::new(claim_type))
    }

    /// Session for `form.id`; an already open session for that claim is returned as is.
    pub fn open(&self, form: ClaimFormData) -> Arc<DraftingSession> {
        let rules = self.config.rules.clone();
        self.sessions
            .entry(form.id)
            .or_insert_with(|| Arc::new(DraftingSession::new(form, rules)))
            .clone()
    }

    /// Load a committed claim and open a session on it.
    pub async fn open_stored(
        &self,
        store: &dyn ClaimStore,
        id: &ClaimId,
    ) -> Result<Arc<DraftingSession>> {
        if let Some(existing) = self.get(id) {
            return Ok(existing);
        }
        let claim = store.load(id).await?;
        let rules = self.config.rules.clone();
        Ok(self
            .sessions
            .entry(claim.id)
            .or_insert_with(|| Arc::new(DraftingSession::from_claim(&claim, rules)))
            .clone())
    }

    pub fn get(&self, id: &ClaimId) -> Option<Arc<DraftingSession>> {
        self.sessions.get(id).map(|entry| entry.clone())
    }

    /// End and forget the session for `id`. Returns false if none was open.
    pub async fn end(&self, id: &ClaimId) -> bool {
        let Some((_, session)) = self.sessions.remove(id) else {
            return false;
        };
        if let Some(request_id) = session.end().await {
            info!(claim_id = %id, request_id = %request_id, "Abandoned draft request on session end");
        }
        true
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for DraftingSessions {
    fn default() -> Self {
        Self::new(DraftConfig::default())
    }
}
