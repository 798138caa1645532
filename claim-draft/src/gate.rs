//! Draft Gate: per-claim state machine deciding when a draft may be requested.
//!
//! ```text
//!            complete                     begin_request
//!   Idle ──────────────▶ Eligible ─────────────────────▶ Requesting
//!    ▲  ◀────────────────   ▲                              │    │
//!    │     incomplete       │ settle                ok     │    │ error / timeout
//!    │                      ├──────────── Succeeded ◀──────┘    │
//!    └──────────────────────┴──────────── Failed    ◀───────────┘
//! ```
//!
//! `Succeeded` and `Failed` are passed through on the way back to `Eligible` (or `Idle`
//! when the claim was edited into an incomplete state while the request was in flight).
//! There is no terminal state.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::claim::{ClaimField, ClaimId};
use crate::error::{DraftError, Result};
use crate::generator::GenerationError;
use crate::validator::ValidationReport;

const MAX_TRANSITIONS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GateState {
    Idle,
    Eligible,
    Requesting { request_id: RequestId },
    Succeeded,
    Failed,
}

impl GateState {
    pub fn name(&self) -> &'static str {
        match self {
            GateState::Idle => "idle",
            GateState::Eligible => "eligible",
            GateState::Requesting { .. } => "requesting",
            GateState::Succeeded => "succeeded",
            GateState::Failed => "failed",
        }
    }

    pub fn is_requesting(&self) -> bool {
        matches!(self, GateState::Requesting { .. })
    }

    /// Returns true if the gate may move from `self` to `target`.
    pub fn can_transition_to(&self, target: &GateState) -> bool {
        use GateState::*;
        matches!(
            (self, target),
            (Idle, Eligible)
                | (Eligible, Idle)
                | (Eligible, Requesting { .. })
                | (Requesting { .. }, Succeeded)
                | (Requesting { .. }, Failed)
                | (Requesting { .. }, Eligible)
                | (Requesting { .. }, Idle)
                | (Succeeded, Eligible)
                | (Succeeded, Idle)
                | (Failed, Eligible)
                | (Failed, Idle)
        )
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DraftOutcome {
    Succeeded { request_id: RequestId },
    Failed { request_id: RequestId, error: GenerationError },
    Abandoned { request_id: RequestId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateTransition {
    pub from: GateState,
    pub to: GateState,
}

#[derive(Debug, Clone)]
pub struct DraftGate {
    claim_id: ClaimId,
    state: GateState,
    /// Completeness as of the latest evaluation, used to settle after a request.
    complete: bool,
    missing: Vec<ClaimField>,
    last_outcome: Option<DraftOutcome>,
    retry_warning: Option<GenerationError>,
    transitions: VecDeque<GateTransition>,
}

impl DraftGate {
    pub fn new(claim_id: ClaimId) -> Self {
        Self {
            claim_id,
            state: GateState::Idle,
            complete: false,
            missing: Vec::new(),
            last_outcome: None,
            retry_warning: None,
            transitions: VecDeque::with_capacity(MAX_TRANSITIONS),
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn last_outcome(&self) -> Option<&DraftOutcome> {
        self.last_outcome.as_ref()
    }

    /// Set after a permanent failure until the claim is edited again.
    pub fn retry_warning(&self) -> Option<&GenerationError> {
        self.retry_warning.as_ref()
    }

    /// Most recent transitions, oldest first.
    pub fn transitions(&self) -> impl Iterator<Item = &GateTransition> {
        self.transitions.iter()
    }

    pub fn in_flight(&self) -> Option<RequestId> {
        match self.state {
            GateState::Requesting { request_id } => Some(request_id),
            _ => None,
        }
    }

    /// Re-evaluate eligibility after the claim changed.
    pub fn evaluate(&mut self, report: &ValidationReport) {
        self.complete = report.is_complete;
        self.missing = report.missing();

        match self.state {
            GateState::Idle if self.complete => self.transition(GateState::Eligible),
            GateState::Eligible if !self.complete => self.transition(GateState::Idle),
            GateState::Requesting { request_id } => {
                debug!(
                    claim_id = %self.claim_id,
                    request_id = %request_id,
                    complete = self.complete,
                    "Claim edited while a draft is being generated"
                );
            }
            _ => {}
        }
    }

    /// A human edit clears any pending warning about retrying a permanent failure.
    pub fn note_human_edit(&mut self) {
        self.retry_warning = None;
    }

    /// Move to `Requesting`; rejects rather than queues when a request is in flight.
    pub fn begin_request(&mut self) -> Result<RequestId> {
        match self.state {
            GateState::Eligible => {
                let request_id = RequestId::new();
                self.transition(GateState::Requesting { request_id });
                Ok(request_id)
            }
            GateState::Requesting { request_id } => {
                warn!(
                    claim_id = %self.claim_id,
                    in_flight = %request_id,
                    "Rejected draft request while another is in flight"
                );
                Err(DraftError::Concurrency {
                    claim_id: self.claim_id,
                })
            }
            _ => Err(DraftError::NotEligible {
                missing: self.missing.clone(),
            }),
        }
    }

    pub fn succeed(&mut self, request_id: RequestId) -> Result<()> {
        self.check_current(request_id)?;
        self.transition(GateState::Succeeded);
        self.last_outcome = Some(DraftOutcome::Succeeded { request_id });
        self.retry_warning = None;
        self.settle();
        Ok(())
    }

    pub fn fail(&mut self, request_id: RequestId, error: GenerationError) -> Result<()> {
        self.check_current(request_id)?;
        self.transition(GateState::Failed);
        self.retry_warning = (!error.is_transient()).then(|| error.clone());
        self.last_outcome = Some(DraftOutcome::Failed { request_id, error });
        self.settle();
        Ok(())
    }

    /// Forget the in-flight request, if any; its result will be treated as stale.
    pub fn abandon(&mut self) -> Option<RequestId> {
        let request_id = self.in_flight()?;
        info!(
            claim_id = %self.claim_id,
            request_id = %request_id,
            "Abandoning in-flight draft request"
        );
        self.last_outcome = Some(DraftOutcome::Abandoned { request_id });
        self.settle();
        Some(request_id)
    }

    fn check_current(&self, request_id: RequestId) -> Result<()> {
        if self.in_flight() == Some(request_id) {
            Ok(())
        } else {
            warn!(
                claim_id = %self.claim_id,
                request_id = %request_id,
                state = %self.state,
                "Discarding result for a request that is no longer in flight"
            );
            Err(DraftError::StaleRequest)
        }
    }

    fn settle(&mut self) {
        let next = if self.complete {
            GateState::Eligible
        } else {
            GateState::Idle
        };
        self.transition(next);
    }

    fn transition(&mut self, to: GateState) {
        let from = self.state;
        debug_assert!(from.can_transition_to(&to), "{from} -> {to}");
        info!(claim_id = %self.claim_id, %from, %to, "Draft gate transition");

        if self.transitions.len() == MAX_TRANSITIONS {
            self.transitions.pop_front();
        }
        self.transitions.push_back(GateTransition { from, to });
        self.state = to;
    }
}
