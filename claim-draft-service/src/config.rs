use anyhow::{Context, Result};
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Service settings, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub openrouter_api_key: String,
    pub draft_model: String,
    pub draft_timeout: Duration,
    pub database_url: Option<String>,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let openrouter_api_key = lookup("OPENROUTER_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .context("OPENROUTER_API_KEY not set")?;

        let draft_timeout = match lookup("DRAFT_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("DRAFT_TIMEOUT_SECS is not a number: {raw}"))?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            openrouter_api_key,
            draft_model: lookup("DRAFT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            draft_timeout: Duration::from_secs(draft_timeout),
            database_url: lookup("DATABASE_URL").filter(|u| !u.trim().is_empty()),
        })
    }
}
