pub mod claim;
pub mod conversation;
pub mod error;
pub mod gate;
pub mod generator;
pub mod message;
pub mod progress;
pub mod session;
pub mod storage;
#[cfg(feature = "postgres")]
pub mod storage_postgres;
pub mod validator;

// Re-export commonly used types
pub use claim::{Claim, ClaimField, ClaimFormData, ClaimId, ClaimType, FormSection, PhotoRef};
pub use conversation::{Conversation, FieldSource, MergeOutcome, Provenance, SkipReason, merge_draft};
pub use error::{DraftError, Result, ValidationError};
pub use gate::{DraftGate, DraftOutcome, GateState, GateTransition, RequestId};
pub use generator::{DraftGenerator, DraftRequest, GenerationError, GenerationErrorKind};
pub use message::{ChatMessage, ClaimDraft, DraftField, DraftId, DraftPayload, MessageId, MessageRole};
pub use progress::{progress, progress_from_report};
pub use session::{DraftConfig, DraftingSession, SessionSnapshot};
pub use storage::{ClaimStore, DraftingSessions, InMemoryClaimStore};
#[cfg(feature = "postgres")]
pub use storage_postgres::PostgresClaimStore;
pub use validator::{FieldRules, FieldStatus, SectionProgress, ValidationReport, validate};
