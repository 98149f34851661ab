//! Pylon REST client
//!
//! Closed issues come from the `/issues/search` endpoint with cursor
//! pagination (`meta.cursor`); per-issue message threads from
//! `/issues/{id}/messages`. Auth is probed against `/me`.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::{ExporterConfig, PYLON_PAGE_SIZE};
use crate::fetcher::http::ApiTransport;
use crate::fetcher::{FetchError, FetchResult, Page, SourceClient};
use crate::{Platform, Record, Revision};

/// Pylon API client
pub struct PylonClient {
    transport: ApiTransport,
    days_back: u32,
    fetch_all_states: bool,
}

impl PylonClient {
    /// Create a new client over an authenticated transport.
    pub fn new(config: &ExporterConfig, transport: ApiTransport) -> Self {
        Self {
            transport,
            days_back: config.days_back,
            fetch_all_states: config.fetch_all_states,
        }
    }

    fn search_body(&self, cursor: Option<&str>) -> Value {
        let mut body = json!({ "limit": PYLON_PAGE_SIZE });
        if !self.fetch_all_states {
            body["filter"] = json!({
                "field": "state",
                "operator": "equals",
                "value": "closed",
            });
        }
        if let Some(token) = cursor {
            body["cursor"] = json!(token);
        }
        body
    }

    /// Extract the next-page token from `meta.cursor`.
    ///
    /// A present-but-non-string cursor means the search contract changed;
    /// that is fatal, not retryable.
    fn next_cursor(response: &Value) -> FetchResult<Option<String>> {
        match response.get("meta").and_then(|m| m.get("cursor")) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(token)) if !token.is_empty() => Ok(Some(token.clone())),
            Some(Value::String(_)) => Ok(None),
            Some(other) => Err(FetchError::InvalidCursorToken(format!(
                "meta.cursor is not a string: {other}"
            ))),
        }
    }

    fn parse_records(&self, data: &[Value]) -> Vec<Record> {
        let cutoff = Revision(Utc::now() - ChronoDuration::days(i64::from(self.days_back)));
        let mut records = Vec::with_capacity(data.len());
        for payload in data {
            match Record::from_payload(payload.clone()) {
                Some(record) => {
                    // The search endpoint has no date filter, so the
                    // look-back window is applied here.
                    if record.revision >= cutoff {
                        records.push(record);
                    } else {
                        debug!(
                            external_id = %record.external_id,
                            revision = %record.revision,
                            "Issue outside look-back window, dropping"
                        );
                    }
                }
                None => warn!("Issue payload without string id, dropping"),
            }
        }
        records
    }
}

#[async_trait]
impl SourceClient for PylonClient {
    fn platform(&self) -> Platform {
        Platform::Pylon
    }

    async fn check_auth(&self) -> FetchResult<()> {
        let me = self.transport.get_json("/me", &[]).await?;
        let org = me
            .get("data")
            .and_then(|d| d.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        debug!(organization = org, "Pylon auth check passed");
        Ok(())
    }

    async fn fetch_issue_page(&self, cursor: Option<&str>) -> FetchResult<Page> {
        let body = self.search_body(cursor);
        let response = self.transport.post_json("/issues/search", &body).await?;

        let data = response
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if data.is_empty() {
            return Ok(Page::end());
        }

        let next_cursor = Self::next_cursor(&response)?;
        Ok(Page {
            records: self.parse_records(&data),
            next_cursor,
        })
    }

    async fn fetch_comment_page(
        &self,
        issue_id: &str,
        _cursor: Option<&str>,
    ) -> FetchResult<Page> {
        let endpoint = format!("/issues/{issue_id}/messages");
        let response = self.transport.get_json(&endpoint, &[]).await?;

        let data = response
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut records = Vec::with_capacity(data.len());
        for mut payload in data {
            // Thread membership is needed downstream; the message payload
            // itself does not carry the issue id.
            if let Some(obj) = payload.as_object_mut() {
                obj.entry("issue_id".to_string())
                    .or_insert_with(|| json!(issue_id));
            }
            match Record::from_payload(payload) {
                Some(record) => records.push(record),
                None => warn!(issue_id, "Message payload without string id, dropping"),
            }
        }

        // The messages endpoint returns the full thread in one response.
        Ok(Page {
            records,
            next_cursor: None,
        })
    }

    fn transport_retries(&self) -> u64 {
        self.transport.retries()
    }
}
