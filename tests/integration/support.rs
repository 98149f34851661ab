//! Shared test fixtures: a cursor-indexed scripted source client and
//! payload builders.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use ticket_data_exporter::config::ExporterConfig;
use ticket_data_exporter::fetcher::{FetchError, FetchResult, Page, SourceClient};
use ticket_data_exporter::{Collection, Platform, Record};

/// How an injected failure should surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailKind {
    /// Transient network error, absorbed by the emulated transport up to
    /// the retry budget
    Network,
    /// Rate-limit budget exhaustion
    RateLimit,
    /// Terminal rejection
    Rejected,
}

impl FailKind {
    fn to_error(self) -> FetchError {
        match self {
            FailKind::Network => FetchError::Network("injected network failure".to_string()),
            FailKind::RateLimit => FetchError::RateLimitExceeded,
            FailKind::Rejected => FetchError::RequestRejected("injected rejection".to_string()),
        }
    }
}

/// Source client driven by a fixed page script.
///
/// Pages are addressed by opaque tokens of the form `page-<n>`, so resuming
/// from a stored cursor fetches exactly the remaining pages. Transient
/// failures injected per page are retried internally, mirroring the real
/// transport, and counted in `transport_retries`.
pub struct ScriptedClient {
    issue_pages: Vec<Vec<Record>>,
    comments: HashMap<String, Vec<Record>>,
    transient_failures: Mutex<HashMap<usize, u32>>,
    hard_failures: Mutex<HashMap<usize, FailKind>>,
    max_transient_retries: u32,
    retries: AtomicU64,
    issue_calls: AtomicU64,
    comment_calls: AtomicU64,
}

impl ScriptedClient {
    pub fn new(issue_pages: Vec<Vec<Record>>) -> Self {
        Self {
            issue_pages,
            comments: HashMap::new(),
            transient_failures: Mutex::new(HashMap::new()),
            hard_failures: Mutex::new(HashMap::new()),
            max_transient_retries: 5,
            retries: AtomicU64::new(0),
            issue_calls: AtomicU64::new(0),
            comment_calls: AtomicU64::new(0),
        }
    }

    /// Inject `count` transient failures before page `page` succeeds.
    pub fn with_transient_failures(self, page: usize, count: u32) -> Self {
        self.transient_failures.lock().unwrap().insert(page, count);
        self
    }

    /// Make page `page` fail on every attempt.
    pub fn with_hard_failure(self, page: usize, kind: FailKind) -> Self {
        self.hard_failures.lock().unwrap().insert(page, kind);
        self
    }

    /// Attach single-page comment threads keyed by issue ID.
    pub fn with_comments(mut self, comments: HashMap<String, Vec<Record>>) -> Self {
        self.comments = comments;
        self
    }

    pub fn issue_calls(&self) -> u64 {
        self.issue_calls.load(Ordering::SeqCst)
    }

    pub fn comment_calls(&self) -> u64 {
        self.comment_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceClient for ScriptedClient {
    fn platform(&self) -> Platform {
        Platform::Pylon
    }

    async fn check_auth(&self) -> FetchResult<()> {
        Ok(())
    }

    async fn fetch_issue_page(&self, cursor: Option<&str>) -> FetchResult<Page> {
        self.issue_calls.fetch_add(1, Ordering::SeqCst);
        let index: usize = match cursor {
            None => 0,
            Some(token) => token
                .strip_prefix("page-")
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| FetchError::InvalidCursorToken(token.to_string()))?,
        };

        if let Some(kind) = self.hard_failures.lock().unwrap().get(&index) {
            return Err(kind.to_error());
        }

        // Emulated transport retry: absorb injected transient failures while
        // the budget lasts.
        {
            let mut plan = self.transient_failures.lock().unwrap();
            if let Some(remaining) = plan.get_mut(&index) {
                let mut attempts = 0u32;
                while *remaining > 0 {
                    if attempts >= self.max_transient_retries {
                        return Err(FetchError::Network(
                            "injected failures exceeded retry budget".to_string(),
                        ));
                    }
                    *remaining -= 1;
                    attempts += 1;
                    self.retries.fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        match self.issue_pages.get(index) {
            Some(records) => Ok(Page {
                records: records.clone(),
                next_cursor: if index + 1 < self.issue_pages.len() {
                    Some(format!("page-{}", index + 1))
                } else {
                    None
                },
            }),
            None => Ok(Page::end()),
        }
    }

    async fn fetch_comment_page(
        &self,
        issue_id: &str,
        _cursor: Option<&str>,
    ) -> FetchResult<Page> {
        self.comment_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Page {
            records: self.comments.get(issue_id).cloned().unwrap_or_default(),
            next_cursor: None,
        })
    }

    fn transport_retries(&self) -> u64 {
        self.retries.load(Ordering::SeqCst)
    }
}

/// A minimal Pylon-shaped issue payload.
pub fn issue(id: &str, updated_at: &str) -> Record {
    Record::from_payload(json!({
        "id": id,
        "number": id.trim_start_matches("iss-").parse::<u64>().unwrap_or(0),
        "title": format!("Issue {id}"),
        "state": "closed",
        "link": format!("https://app.usepylon.com/issues/{id}"),
        "created_at": "2026-01-01T00:00:00Z",
        "updated_at": updated_at,
        "body_html": "<p>Something broke</p>",
    }))
    .unwrap()
}

/// A Pylon-shaped message payload carrying its parent issue ID.
pub fn comment(id: &str, issue_id: &str, updated_at: &str) -> Record {
    Record::from_payload(json!({
        "id": id,
        "issue_id": issue_id,
        "timestamp": updated_at,
        "created_at": updated_at,
        "updated_at": updated_at,
        "message_html": "<p>Looking into it</p>",
        "author": {"name": "Agent", "user": {"id": "u1"}},
    }))
    .unwrap()
}

/// A page of `count` issues with distinct IDs starting at `first`.
pub fn issue_page(first: usize, count: usize) -> Vec<Record> {
    (first..first + count)
        .map(|n| issue(&format!("iss-{n}"), "2026-01-10T00:00:00Z"))
        .collect()
}

/// A config pointing all directories under `dir`, without touching the
/// environment.
pub fn test_config(dir: &std::path::Path, collections: Vec<Collection>) -> ExporterConfig {
    ExporterConfig {
        platform: Platform::Pylon,
        api_token: "test-token".to_string(),
        base_url: "http://localhost".to_string(),
        days_back: 180,
        team_id: None,
        fetch_all_states: false,
        collections,
        concurrency: 2,
        request_timeout: Duration::from_secs(5),
        max_transient_retries: 5,
        max_rate_limit_retries: 5,
        requests_per_window: 1000,
        rate_limit_window: Duration::from_secs(60),
        state_dir: dir.join("state"),
        raw_dir: dir.join("raw"),
        out_dir: dir.join("out"),
    }
}
