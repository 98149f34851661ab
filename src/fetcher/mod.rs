//! Platform client implementations
//!
//! Each source platform paginates differently (Pylon: REST search cursors,
//! Linear: GraphQL `pageInfo`). Both are abstracted behind [`SourceClient`]
//! so the fetch engine never branches on the platform.

use crate::config::ExporterConfig;
use crate::engine::rate_limit::RateLimiter;
use crate::{Platform, Record};
use async_trait::async_trait;
use std::sync::Arc;

pub mod http;
pub mod linear;
pub mod pylon;

/// Fetcher errors.
///
/// `Network`, `Api` and `Parse` only escape the transport after the
/// relevant retry budget is spent; callers treat everything here as
/// terminal for the current call.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// 429 responses exhausted the rate-limit retry budget
    #[error("rate limit exceeded after retries")]
    RateLimitExceeded,

    /// Non-retryable rejection (bad auth, malformed request, GraphQL errors)
    #[error("request rejected: {0}")]
    RequestRejected(String),

    /// The remote returned a cursor the engine cannot resume from; likely an
    /// API contract change needing human attention
    #[error("invalid cursor token: {0}")]
    InvalidCursorToken(String),

    /// Network failure (timeout, connection) after retries
    #[error("network error: {0}")]
    Network(String),

    /// Server-side failure (5xx) after retries
    #[error("API error: {0}")]
    Api(String),

    /// Response body did not deserialize into the expected shape
    #[error("parse error: {0}")]
    Parse(String),
}

impl FetchError {
    /// Whether this error aborts the collection immediately (no partial
    /// outcome, checkpoint untouched).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FetchError::RequestRejected(_) | FetchError::InvalidCursorToken(_)
        )
    }
}

/// Result type for fetcher operations
pub type FetchResult<T> = Result<T, FetchError>;

/// One page of a paginated traversal.
///
/// `next_cursor == None` signals the end of the collection; any other value
/// is the opaque token to resume from after this page.
#[derive(Debug, Clone)]
pub struct Page {
    /// Records in this page
    pub records: Vec<Record>,
    /// Opaque resumption token for the following page
    pub next_cursor: Option<String>,
}

impl Page {
    /// A terminal empty page.
    pub fn end() -> Self {
        Page {
            records: Vec::new(),
            next_cursor: None,
        }
    }
}

/// Paginated access to one source platform.
///
/// Implementations are restartable: `fetch_issue_page(Some(token))` with a
/// previously returned token reproduces the remainder of the traversal
/// (modulo upstream writes, which incremental sync tolerates).
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// The platform this client talks to
    fn platform(&self) -> Platform;

    /// Verify credentials with a cheap probe request.
    ///
    /// Auth failures surface as [`FetchError::RequestRejected`] before any
    /// collection work starts.
    async fn check_auth(&self) -> FetchResult<()>;

    /// Fetch one page of issues, starting from `cursor` (or the collection
    /// start when `None`).
    async fn fetch_issue_page(&self, cursor: Option<&str>) -> FetchResult<Page>;

    /// Fetch one page of comments for a specific issue.
    async fn fetch_comment_page(&self, issue_id: &str, cursor: Option<&str>)
        -> FetchResult<Page>;

    /// Whether issue pages arrive ordered by revision, newest first.
    ///
    /// When true, an incremental run can stop as soon as a whole page falls
    /// at or below the previous traversal's watermark; everything after it
    /// is unchanged.
    fn pages_newest_first(&self) -> bool {
        false
    }

    /// Retries absorbed by the underlying transport so far.
    fn transport_retries(&self) -> u64 {
        0
    }
}

/// Create a client for the configured platform.
pub fn create_client(
    config: &ExporterConfig,
    rate_limiter: Arc<RateLimiter>,
) -> FetchResult<Box<dyn SourceClient>> {
    let transport = http::ApiTransport::new(config, rate_limiter)
        .map_err(|e| FetchError::Network(format!("failed to build HTTP client: {e}")))?;

    match config.platform {
        Platform::Pylon => Ok(Box::new(pylon::PylonClient::new(config, transport))),
        Platform::Linear => Ok(Box::new(linear::LinearClient::new(config, transport))),
    }
}
