//! HTTP/GraphQL transport shared by the platform clients
//!
//! Provides unified request handling with:
//! - Rate limiter integration (every call consults the shared window)
//! - Bounded exponential-backoff retries, with separate budgets for
//!   rate-limit signals and transient failures
//! - Terminal error classification (callers never see individual retries)

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::ExporterConfig;
use crate::engine::rate_limit::{backoff_delay, RateLimiter};
use crate::fetcher::{FetchError, FetchResult};
use crate::Platform;

/// How a response status feeds the retry loop.
///
/// Rate-limit signals and transient server failures draw from separate
/// budgets; other client errors never retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryClass {
    /// 2xx, hand the body to the caller
    Success,
    /// 429, retry against the rate-limit budget
    RateLimited,
    /// 5xx, retry against the transient budget
    Transient,
    /// Any other 4xx, fail immediately
    Rejected,
}

fn classify_status(status: StatusCode) -> RetryClass {
    if status == StatusCode::TOO_MANY_REQUESTS {
        RetryClass::RateLimited
    } else if status.is_server_error() {
        RetryClass::Transient
    } else if status.is_client_error() {
        RetryClass::Rejected
    } else {
        RetryClass::Success
    }
}

/// Unified HTTP client for all source API interactions.
pub struct ApiTransport {
    client: Client,
    base_url: String,
    rate_limiter: Arc<RateLimiter>,
    max_transient_retries: u32,
    max_rate_limit_retries: u32,
    retry_count: AtomicU64,
}

impl ApiTransport {
    /// Build a transport from the run configuration.
    ///
    /// The credential header differs per platform: Pylon expects a bearer
    /// token, Linear takes the API key verbatim.
    pub fn new(
        config: &ExporterConfig,
        rate_limiter: Arc<RateLimiter>,
    ) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        let auth_value = match config.platform {
            Platform::Pylon => format!("Bearer {}", config.api_token),
            Platform::Linear => config.api_token.clone(),
        };
        if let Ok(mut value) = HeaderValue::from_str(&auth_value) {
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            rate_limiter,
            max_transient_retries: config.max_transient_retries,
            max_rate_limit_retries: config.max_rate_limit_retries,
            retry_count: AtomicU64::new(0),
        })
    }

    /// Base URL this transport talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Total retries performed by this transport so far.
    pub fn retries(&self) -> u64 {
        self.retry_count.load(Ordering::Relaxed)
    }

    /// Execute a GET request against `endpoint` with query parameters.
    pub async fn get_json(&self, endpoint: &str, params: &[(&str, String)]) -> FetchResult<Value> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!(url = %url, params = params.len(), "GET request");
        let request = self.client.get(&url).query(params);
        self.send_with_retry(request, &url).await
    }

    /// Execute a POST request with a JSON body.
    pub async fn post_json(&self, endpoint: &str, body: &Value) -> FetchResult<Value> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!(url = %url, "POST request");
        let request = self.client.post(&url).json(body);
        self.send_with_retry(request, &url).await
    }

    /// Execute a GraphQL query and return the `data` object.
    ///
    /// GraphQL-level errors are protocol rejections, not transient
    /// conditions, so they map to [`FetchError::RequestRejected`].
    pub async fn graphql(&self, query: &str, variables: Value) -> FetchResult<Value> {
        let body = serde_json::json!({ "query": query, "variables": variables });
        debug!(url = %self.base_url, "GraphQL query");
        let request = self.client.post(&self.base_url).json(&body);
        let result = self.send_with_retry(request, &self.base_url).await?;

        if let Some(errors) = result.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let messages: Vec<&str> = errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(Value::as_str))
                    .collect();
                return Err(FetchError::RequestRejected(format!(
                    "GraphQL errors: {}",
                    messages.join("; ")
                )));
            }
        }

        Ok(result.get("data").cloned().unwrap_or(Value::Null))
    }

    /// Send a request with retries.
    ///
    /// Retries on network errors, 5xx, and 429 (each against its own
    /// budget). Does not retry other 4xx or deserialization failures.
    async fn send_with_retry(&self, request: RequestBuilder, url: &str) -> FetchResult<Value> {
        let mut transient_attempts: u32 = 0;
        let mut rate_limit_attempts: u32 = 0;

        loop {
            let attempt_request = request.try_clone().ok_or_else(|| {
                FetchError::Network("request body cannot be replayed".to_string())
            })?;

            // Consult the window limiter before every attempt, retries included.
            self.rate_limiter
                .acquire()
                .await
                .map_err(|e| FetchError::Network(format!("rate limiter: {e}")))?;

            let response = match attempt_request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    transient_attempts += 1;
                    if transient_attempts > self.max_transient_retries {
                        return Err(FetchError::Network(e.to_string()));
                    }
                    let backoff = backoff_delay(transient_attempts - 1);
                    warn!(
                        url = %url,
                        attempt = transient_attempts,
                        max = self.max_transient_retries,
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "Network error, retrying"
                    );
                    self.retry_count.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            };

            let status = response.status();

            match classify_status(status) {
                RetryClass::RateLimited => {
                    rate_limit_attempts += 1;
                    if rate_limit_attempts > self.max_rate_limit_retries {
                        return Err(FetchError::RateLimitExceeded);
                    }
                    let backoff = backoff_delay(rate_limit_attempts - 1);
                    warn!(
                        url = %url,
                        attempt = rate_limit_attempts,
                        max = self.max_rate_limit_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "Rate limited (429), backing off"
                    );
                    self.retry_count.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(backoff).await;
                }
                RetryClass::Transient => {
                    transient_attempts += 1;
                    if transient_attempts > self.max_transient_retries {
                        return Err(FetchError::Api(format!("server error: {status}")));
                    }
                    let backoff = backoff_delay(transient_attempts - 1);
                    warn!(
                        url = %url,
                        status = %status,
                        attempt = transient_attempts,
                        max = self.max_transient_retries,
                        "Server error, retrying"
                    );
                    self.retry_count.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(backoff).await;
                }
                RetryClass::Rejected => {
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<unreadable body>".to_string());
                    return Err(FetchError::RequestRejected(format!(
                        "{status}: {}",
                        truncate(&body, 300)
                    )));
                }
                RetryClass::Success => {
                    return match response.json::<Value>().await {
                        Ok(value) => {
                            debug!(url = %url, "Request succeeded");
                            Ok(value)
                        }
                        Err(e) => Err(FetchError::Parse(format!(
                            "failed to deserialize response: {e}"
                        ))),
                    };
                }
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
