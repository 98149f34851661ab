//! Run configuration
//!
//! All configuration is resolved once at process start and stays immutable
//! for the duration of the run (shared via `Arc`).

use crate::{Collection, Platform};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Maximum allowed concurrency to prevent self-inflicted rate limiting
pub const MAX_CONCURRENCY: usize = 8;

/// Default look-back window in days, matching the platform retention the
/// downstream knowledge base cares about
pub const DEFAULT_DAYS_BACK: u32 = 180;

/// Default Pylon REST base URL
pub const PYLON_BASE_URL: &str = "https://api.usepylon.com";

/// Default Linear GraphQL endpoint
pub const LINEAR_BASE_URL: &str = "https://api.linear.app/graphql";

/// Pylon search page size
pub const PYLON_PAGE_SIZE: usize = 100;

/// Linear issues page size
pub const LINEAR_ISSUE_PAGE_SIZE: usize = 50;

/// Linear comments page size
pub const LINEAR_COMMENT_PAGE_SIZE: usize = 100;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable missing
    #[error("missing environment variable: {0}")]
    MissingVar(String),

    /// A value failed to parse or is out of range
    #[error("invalid value for {name}: {reason}")]
    InvalidValue {
        /// Setting name
        name: String,
        /// Why it was rejected
        reason: String,
    },
}

/// Immutable configuration for one exporter run
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Source platform
    pub platform: Platform,
    /// API credential (bearer token for Pylon, API key for Linear)
    pub api_token: String,
    /// API base URL (REST base or GraphQL endpoint)
    pub base_url: String,
    /// How many days back to fetch
    pub days_back: u32,
    /// Optional Linear team filter
    pub team_id: Option<String>,
    /// Fetch issues in any state instead of closed/completed only
    pub fetch_all_states: bool,
    /// Collections enabled for this run
    pub collections: Vec<Collection>,
    /// Concurrent collection workers (1..=MAX_CONCURRENCY)
    pub concurrency: usize,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Retry budget for transient errors (timeouts, 5xx)
    pub max_transient_retries: u32,
    /// Retry budget for rate-limit (429) responses
    pub max_rate_limit_retries: u32,
    /// Requests allowed per rate-limit window
    pub requests_per_window: usize,
    /// Rate-limit window length
    pub rate_limit_window: Duration,
    /// Directory holding checkpoint files
    pub state_dir: PathBuf,
    /// Directory holding the raw record store
    pub raw_dir: PathBuf,
    /// Directory the transform pipeline writes to
    pub out_dir: PathBuf,
}

impl ExporterConfig {
    /// Build a configuration from environment variables.
    ///
    /// `TICKET_EXPORTER_PLATFORM` selects the source; the credential comes
    /// from `PYLON_API_TOKEN` or `LINEAR_API_KEY` accordingly. Everything
    /// else has a default and an optional `TICKET_EXPORTER_*` override.
    pub fn from_env() -> Result<Self, ConfigError> {
        let platform = match std::env::var("TICKET_EXPORTER_PLATFORM") {
            Ok(v) => Platform::from_str(&v).map_err(|e| ConfigError::InvalidValue {
                name: "TICKET_EXPORTER_PLATFORM".to_string(),
                reason: e,
            })?,
            Err(_) => Platform::Pylon,
        };
        Self::from_env_for(platform)
    }

    /// Build a configuration from the environment for a specific platform.
    pub fn from_env_for(platform: Platform) -> Result<Self, ConfigError> {
        let token_var = match platform {
            Platform::Pylon => "PYLON_API_TOKEN",
            Platform::Linear => "LINEAR_API_KEY",
        };
        let api_token = std::env::var(token_var)
            .map_err(|_| ConfigError::MissingVar(token_var.to_string()))?;

        let base_url = std::env::var("TICKET_EXPORTER_BASE_URL").unwrap_or_else(|_| {
            match platform {
                Platform::Pylon => PYLON_BASE_URL,
                Platform::Linear => LINEAR_BASE_URL,
            }
            .to_string()
        });

        let days_back = parse_env_or("TICKET_EXPORTER_DAYS_BACK", DEFAULT_DAYS_BACK)?;
        let concurrency = parse_env_or("TICKET_EXPORTER_CONCURRENCY", 2usize)?;
        let fetch_all_states = std::env::var("FETCH_ALL_STATES")
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);

        let config = Self {
            platform,
            api_token,
            base_url,
            days_back,
            team_id: std::env::var("LINEAR_TEAM_ID").ok(),
            fetch_all_states,
            collections: Collection::all().to_vec(),
            concurrency,
            request_timeout: Duration::from_secs(30),
            max_transient_retries: 5,
            max_rate_limit_retries: 5,
            requests_per_window: 60,
            rate_limit_window: Duration::from_secs(60),
            state_dir: env_path_or("TICKET_EXPORTER_STATE_DIR", "./state"),
            raw_dir: env_path_or("TICKET_EXPORTER_RAW_DIR", "./raw"),
            out_dir: env_path_or("TICKET_EXPORTER_OUT_DIR", "./kapa_out"),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate ranges that would make a run misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::InvalidValue {
                name: "concurrency".to_string(),
                reason: format!("must be 1..={MAX_CONCURRENCY}, got {}", self.concurrency),
            });
        }
        if self.days_back == 0 {
            return Err(ConfigError::InvalidValue {
                name: "days_back".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.requests_per_window == 0 {
            return Err(ConfigError::InvalidValue {
                name: "requests_per_window".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Whether a collection is enabled for this run.
    pub fn collection_enabled(&self, collection: Collection) -> bool {
        self.collections.contains(&collection)
    }
}

fn env_path_or(var: &str, default: &str) -> PathBuf {
    std::env::var(var)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

fn parse_env_or<T>(var: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(v) => v.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            name: var.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
