//! Application configuration loaded from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ApiError;

/// Runtime configuration for the server.
///
/// Required env vars:
/// - `DATABASE_URL`: Postgres connection string
/// - `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET`: OAuth client used to refresh Gmail tokens
/// - `OPENAI_API_KEY`: key for the chat-completion provider
#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub llm: LlmConfig,
    pub sync: SyncConfig,
    pub gmail_timeout: Duration,
    pub bind_addr: SocketAddr,
}

/// Chat-completion provider settings
#[derive(Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Knobs for the sync orchestrator and the batch annotation sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Maximum message ids listed per sync call (default: 50)
    pub max_results: u32,
    /// Window used on a user's first sync (default: 7 days)
    pub first_sync_days: u32,
    /// Number of recent emails examined by the annotation sweep (default: 20)
    pub annotate_batch_limit: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_results: 50,
            first_sync_days: 7,
            annotate_batch_limit: 20,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ApiError> {
        let bind_addr = std::env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()
            .map_err(|_| ApiError::Config("BIND_ADDR is not a valid socket address".to_string()))?;

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            google_client_id: required("GOOGLE_CLIENT_ID")?,
            google_client_secret: required("GOOGLE_CLIENT_SECRET")?,
            llm: LlmConfig {
                api_key: required("OPENAI_API_KEY")?,
                model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                base_url: std::env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                timeout: Duration::from_secs(parsed_or("LLM_TIMEOUT_SECS", 60)),
            },
            sync: SyncConfig {
                max_results: parsed_or("SYNC_MAX_RESULTS", 50),
                first_sync_days: parsed_or("FIRST_SYNC_DAYS", 7),
                annotate_batch_limit: parsed_or("ANNOTATE_BATCH_LIMIT", 20),
            },
            gmail_timeout: Duration::from_secs(parsed_or("GMAIL_TIMEOUT_SECS", 30)),
            bind_addr,
        })
    }
}

fn required(var_name: &str) -> Result<String, ApiError> {
    std::env::var(var_name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::missing_env(var_name))
}

fn parsed_or<T: std::str::FromStr>(var_name: &str, default: T) -> T {
    std::env::var(var_name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
