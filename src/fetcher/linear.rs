//! Linear GraphQL client
//!
//! Issues are pulled through cursor pagination (`pageInfo.endCursor`,
//! ordered by `updatedAt`), comments per issue through the nested
//! `comments` connection. Auth is probed with a `viewer` query.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::{ExporterConfig, LINEAR_COMMENT_PAGE_SIZE, LINEAR_ISSUE_PAGE_SIZE};
use crate::fetcher::http::ApiTransport;
use crate::fetcher::{FetchError, FetchResult, Page, SourceClient};
use crate::{Platform, Record};

const ISSUES_QUERY: &str = r#"
query FetchClosedIssues($filter: IssueFilter!, $first: Int!, $after: String) {
  issues(filter: $filter, first: $first, after: $after, orderBy: updatedAt) {
    pageInfo {
      hasNextPage
      endCursor
    }
    nodes {
      id
      identifier
      number
      title
      description
      url
      priority
      priorityLabel
      createdAt
      updatedAt
      completedAt
      canceledAt
      state {
        id
        name
        type
      }
      team {
        id
        name
        key
      }
      assignee {
        id
        name
        email
      }
      creator {
        id
        name
        email
      }
      labels {
        nodes {
          id
          name
          color
        }
      }
      project {
        id
        name
      }
      cycle {
        id
        name
        number
      }
    }
  }
}
"#;

const COMMENTS_QUERY: &str = r#"
query FetchComments($issueId: String!, $first: Int!, $after: String) {
  issue(id: $issueId) {
    comments(first: $first, after: $after) {
      pageInfo {
        hasNextPage
        endCursor
      }
      nodes {
        id
        body
        createdAt
        updatedAt
        user {
          id
          name
          email
        }
        botActor {
          name
        }
      }
    }
  }
}
"#;

const VIEWER_QUERY: &str = r#"
query ViewerHealth {
  viewer {
    id
    name
    email
  }
  organization {
    id
    name
  }
}
"#;

/// Linear API client
pub struct LinearClient {
    transport: ApiTransport,
    days_back: u32,
    team_id: Option<String>,
    fetch_all_states: bool,
}

impl LinearClient {
    /// Create a new client over an authenticated transport.
    pub fn new(config: &ExporterConfig, transport: ApiTransport) -> Self {
        Self {
            transport,
            days_back: config.days_back,
            team_id: config.team_id.clone(),
            fetch_all_states: config.fetch_all_states,
        }
    }

    fn issue_filter(&self) -> Value {
        let cutoff = (Utc::now() - ChronoDuration::days(i64::from(self.days_back)))
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();

        let mut filter = json!({ "updatedAt": { "gte": cutoff } });
        if !self.fetch_all_states {
            filter["state"] = json!({ "type": { "in": ["completed", "canceled"] } });
        }
        if let Some(team_id) = &self.team_id {
            filter["team"] = json!({ "id": { "eq": team_id } });
        }
        filter
    }

    /// Read `pageInfo` out of a connection object.
    ///
    /// `hasNextPage: true` with a missing or non-string `endCursor` means
    /// the traversal cannot continue safely; that is a contract violation,
    /// not a transient condition.
    fn next_cursor(connection: &Value) -> FetchResult<Option<String>> {
        let page_info = connection
            .get("pageInfo")
            .ok_or_else(|| FetchError::InvalidCursorToken("missing pageInfo".to_string()))?;
        let has_next = page_info
            .get("hasNextPage")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !has_next {
            return Ok(None);
        }
        match page_info.get("endCursor") {
            Some(Value::String(token)) if !token.is_empty() => Ok(Some(token.clone())),
            other => Err(FetchError::InvalidCursorToken(format!(
                "hasNextPage with unusable endCursor: {other:?}"
            ))),
        }
    }

    fn parse_nodes(connection: &Value, issue_id: Option<&str>) -> Vec<Record> {
        let nodes = connection
            .get("nodes")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut records = Vec::with_capacity(nodes.len());
        for mut payload in nodes {
            if let (Some(issue_id), Some(obj)) = (issue_id, payload.as_object_mut()) {
                obj.entry("issue_id".to_string())
                    .or_insert_with(|| json!(issue_id));
            }
            match Record::from_payload(payload) {
                Some(record) => records.push(record),
                None => warn!("Node without string id, dropping"),
            }
        }
        records
    }
}

#[async_trait]
impl SourceClient for LinearClient {
    fn platform(&self) -> Platform {
        Platform::Linear
    }

    async fn check_auth(&self) -> FetchResult<()> {
        let data = self.transport.graphql(VIEWER_QUERY, json!({})).await?;
        let viewer = data
            .get("viewer")
            .and_then(|v| v.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let org = data
            .get("organization")
            .and_then(|o| o.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        debug!(viewer, organization = org, "Linear auth check passed");
        Ok(())
    }

    async fn fetch_issue_page(&self, cursor: Option<&str>) -> FetchResult<Page> {
        let mut variables = json!({
            "filter": self.issue_filter(),
            "first": LINEAR_ISSUE_PAGE_SIZE,
        });
        if let Some(token) = cursor {
            variables["after"] = json!(token);
        }

        let data = self.transport.graphql(ISSUES_QUERY, variables).await?;
        let connection = data
            .get("issues")
            .ok_or_else(|| FetchError::Parse("response missing issues connection".to_string()))?;

        let records = Self::parse_nodes(connection, None);
        if records.is_empty() {
            return Ok(Page::end());
        }

        let next_cursor = Self::next_cursor(connection)?;
        Ok(Page {
            records,
            next_cursor,
        })
    }

    async fn fetch_comment_page(
        &self,
        issue_id: &str,
        cursor: Option<&str>,
    ) -> FetchResult<Page> {
        let mut variables = json!({
            "issueId": issue_id,
            "first": LINEAR_COMMENT_PAGE_SIZE,
        });
        if let Some(token) = cursor {
            variables["after"] = json!(token);
        }

        let data = self.transport.graphql(COMMENTS_QUERY, variables).await?;
        let connection = match data.get("issue").filter(|v| !v.is_null()) {
            Some(issue) => issue.get("comments").cloned().unwrap_or(Value::Null),
            // Issue deleted between pages; treat as an empty thread.
            None => return Ok(Page::end()),
        };
        if connection.is_null() {
            return Ok(Page::end());
        }

        let records = Self::parse_nodes(&connection, Some(issue_id));
        let next_cursor = Self::next_cursor(&connection)?;
        Ok(Page {
            records,
            next_cursor,
        })
    }

    // `orderBy: updatedAt` returns the most recently updated issues first.
    fn pages_newest_first(&self) -> bool {
        true
    }

    fn transport_retries(&self) -> u64 {
        self.transport.retries()
    }
}
