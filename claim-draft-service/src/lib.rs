pub mod chat_bridge;
pub mod config;
pub mod generator;
pub mod service;

pub use config::ServiceConfig;
pub use generator::{RigDraftGenerator, get_llm_agent};
pub use service::{AppState, create_app};
