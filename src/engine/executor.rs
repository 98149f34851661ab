//! Fetch run orchestration.
//!
//! Drives the per-collection state machine: resume from checkpoint, fetch a
//! page, persist it to the raw store, then advance the checkpoint. The
//! checkpoint is written strictly after the page it describes is on disk, so
//! a crash at any point re-fetches at most one page and the idempotent store
//! absorbs the duplicates.

use crate::config::ExporterConfig;
use crate::cursor::{Checkpoint, CursorStore};
use crate::engine::job::{CollectionSummary, RunSummary};
use crate::engine::rate_limit::RateLimiter;
use crate::engine::EngineError;
use crate::fetcher::{create_client, FetchError, FetchResult, Page, SourceClient};
use crate::shutdown::ShutdownHandle;
use crate::store::{RawStore, StoreError};
use crate::{Collection, Record};
use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Runaway pagination guard. A traversal that reaches this many pages stops
/// with a partial outcome instead of looping on a cycling cursor.
const MAX_PAGES: u64 = 10_000;

/// Why a comment drain stopped the run at the current page.
///
/// A store failure is always fatal: the records are not on disk, so
/// retrying against the same disk state would lose them again.
#[derive(Debug)]
enum PageFailure {
    Fetch(FetchError),
    Store(StoreError),
}

impl PageFailure {
    fn is_fatal(&self) -> bool {
        match self {
            PageFailure::Fetch(e) => e.is_fatal(),
            PageFailure::Store(_) => true,
        }
    }
}

impl fmt::Display for PageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageFailure::Fetch(e) => write!(f, "{e}"),
            PageFailure::Store(e) => write!(f, "{e}"),
        }
    }
}

/// Orchestrates one fetch run across the enabled collections.
pub struct SyncExecutor {
    config: Arc<ExporterConfig>,
    client: Arc<dyn SourceClient>,
    cursor_store: CursorStore,
    raw_store: RawStore,
    shutdown: Option<ShutdownHandle>,
}

impl SyncExecutor {
    /// Create an executor for the configured platform.
    pub fn new(config: ExporterConfig) -> Result<Self, EngineError> {
        let rate_limiter = Arc::new(RateLimiter::new(
            config.requests_per_window,
            config.rate_limit_window,
        ));
        let client: Arc<dyn SourceClient> = Arc::from(create_client(&config, rate_limiter)?);
        Ok(Self::with_client(config, client))
    }

    /// Create an executor around an existing client.
    pub fn with_client(config: ExporterConfig, client: Arc<dyn SourceClient>) -> Self {
        let cursor_store = CursorStore::new(config.state_dir.clone());
        let raw_store = RawStore::new(config.raw_dir.clone());
        Self {
            config: Arc::new(config),
            client,
            cursor_store,
            raw_store,
            shutdown: None,
        }
    }

    /// Attach a shutdown handle so the run stops at page boundaries.
    pub fn with_shutdown(mut self, shutdown: ShutdownHandle) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Discard the checkpoint for a collection so the next run starts fresh.
    pub fn reset(&self, collection: Collection) -> Result<(), EngineError> {
        self.cursor_store.reset(collection)?;
        Ok(())
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_tripped())
            .unwrap_or(false)
    }

    /// Run the fetch across all enabled collections and report the outcome.
    pub async fn run(&self) -> RunSummary {
        let started_at = Utc::now();
        let mut collections = Vec::new();

        info!(platform = %self.client.platform(), "Verifying credentials");
        if let Err(e) = self.client.check_auth().await {
            error!(error = %e, "Credential check failed, aborting run");
            for collection in Collection::all() {
                if self.config.collection_enabled(collection) {
                    let mut summary = CollectionSummary::new(collection);
                    summary.mark_failed(format!("auth check failed: {e}"));
                    collections.push(summary);
                }
            }
            return self.finish(started_at, collections);
        }

        let issues_enabled = self.config.collection_enabled(Collection::Issues);
        let comments_enabled = self.config.collection_enabled(Collection::Comments);

        if issues_enabled {
            let (issues, comments) = self.sync_issues(comments_enabled).await;
            collections.push(issues);
            if let Some(comments) = comments {
                collections.push(comments);
            }
        } else if comments_enabled {
            collections.push(self.sync_comments_standalone().await);
        }

        self.finish(started_at, collections)
    }

    fn finish(&self, started_at: DateTime<Utc>, collections: Vec<CollectionSummary>) -> RunSummary {
        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            collections,
            transport_retries: self.client.transport_retries(),
        };
        for c in &summary.collections {
            info!(
                collection = %c.collection,
                outcome = %c.outcome,
                pages = c.pages,
                fetched = c.fetched,
                inserted = c.inserted,
                superseded = c.superseded,
                skipped = c.skipped,
                "Collection finished"
            );
        }
        summary
    }

    /// Traverse the issues collection, draining each page's comment threads
    /// before the issues checkpoint advances past that page.
    async fn sync_issues(
        &self,
        with_comments: bool,
    ) -> (CollectionSummary, Option<CollectionSummary>) {
        let mut issues = CollectionSummary::new(Collection::Issues);
        let mut comments = with_comments.then(|| CollectionSummary::new(Collection::Comments));

        // On an incremental pass over a newest-first source, a page whose
        // records all fall at or below the previous watermark means the rest
        // of the traversal is unchanged and can be cut short.
        let mut stop_below: Option<DateTime<Utc>> = None;
        let (mut cursor, mut watermark, mut page_index) =
            match self.cursor_store.load(Collection::Issues) {
                Some(cp) if cp.is_complete() => {
                    info!(
                        watermark = ?cp.watermark(),
                        "Previous traversal complete, starting a fresh incremental pass"
                    );
                    if self.client.pages_newest_first() {
                        stop_below = cp.watermark();
                    }
                    (None, cp.watermark(), 0)
                }
                Some(cp) => {
                    info!(
                        page = cp.last_page_index(),
                        "Resuming issues from checkpoint"
                    );
                    (cp.cursor_token().map(str::to_string), cp.watermark(), cp.last_page_index())
                }
                None => {
                    info!("No checkpoint found, starting full traversal");
                    (None, None, 0)
                }
            };
        let mut comment_watermark = self
            .cursor_store
            .load(Collection::Comments)
            .and_then(|cp| cp.watermark());

        loop {
            if self.shutdown_requested() {
                info!("Shutdown requested, stopping at page boundary");
                issues.mark_partial("shutdown requested");
                if let Some(c) = comments.as_mut() {
                    c.mark_partial("shutdown requested");
                }
                break;
            }
            if page_index >= MAX_PAGES {
                warn!(pages = page_index, "Page limit reached, stopping");
                issues.mark_partial("page limit reached");
                break;
            }

            let page = match self.client.fetch_issue_page(cursor.as_deref()).await {
                Ok(page) => page,
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Fatal fetch error, checkpoint untouched");
                    issues.mark_failed(e.to_string());
                    if let Some(c) = comments.as_mut() {
                        c.mark_failed(e.to_string());
                    }
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Retries exhausted, stopping with resumable checkpoint");
                    issues.mark_partial(e.to_string());
                    if let Some(c) = comments.as_mut() {
                        c.mark_partial(e.to_string());
                    }
                    break;
                }
            };

            debug!(
                page = page_index + 1,
                records = page.records.len(),
                has_next = page.next_cursor.is_some(),
                "Fetched issues page"
            );

            let (inserted, superseded, skipped) =
                match self.raw_store.append_page(Collection::Issues, &page.records) {
                    Ok(counts) => counts,
                    Err(e) => {
                        error!(error = %e, "Raw store write failed");
                        issues.mark_failed(e.to_string());
                        if let Some(c) = comments.as_mut() {
                            c.mark_failed(e.to_string());
                        }
                        break;
                    }
                };
            issues.record_page(page.records.len() as u64, inserted, superseded, skipped);
            for record in &page.records {
                watermark = Checkpoint::max_watermark(watermark, Some(record.revision.0));
            }
            page_index += 1;

            let unchanged_tail = stop_below
                .map(|w| page.records.iter().all(|r| r.revision.0 <= w))
                .unwrap_or(false);
            // An early stop must still leave a complete checkpoint.
            let next_cursor = if unchanged_tail {
                None
            } else {
                page.next_cursor.clone()
            };

            if let Some(c) = comments.as_mut() {
                match self
                    .drain_page_comments(&page, c, &mut comment_watermark)
                    .await
                {
                    Ok(()) => {}
                    Err(stop) => {
                        // Comments for this page are incomplete, so the
                        // issues checkpoint must not advance past it either.
                        if stop.is_fatal() {
                            issues.mark_failed(stop.to_string());
                            c.mark_failed(stop.to_string());
                        } else {
                            issues.mark_partial(stop.to_string());
                            c.mark_partial(stop.to_string());
                        }
                        break;
                    }
                }
                let comment_cp =
                    Checkpoint::after_page(next_cursor.clone(), comment_watermark, page_index);
                if let Err(e) = self.cursor_store.save(Collection::Comments, &comment_cp) {
                    error!(error = %e, "Comments checkpoint write failed");
                    issues.mark_failed(e.to_string());
                    c.mark_failed(e.to_string());
                    break;
                }
            }

            let checkpoint = Checkpoint::after_page(next_cursor.clone(), watermark, page_index);
            if let Err(e) = self.cursor_store.save(Collection::Issues, &checkpoint) {
                error!(error = %e, "Issues checkpoint write failed");
                issues.mark_failed(e.to_string());
                if let Some(c) = comments.as_mut() {
                    c.mark_failed(e.to_string());
                }
                break;
            }

            match next_cursor {
                Some(next) => cursor = Some(next),
                None if unchanged_tail => {
                    info!(
                        pages = page_index,
                        watermark = ?stop_below,
                        "Reached records at or below the previous watermark, stopping early"
                    );
                    break;
                }
                None => {
                    info!(pages = page_index, "Issues traversal complete");
                    break;
                }
            }
        }

        (issues, comments)
    }

    /// Drain every comment thread referenced by one issues page.
    ///
    /// Threads are drained concurrently up to the configured limit; any
    /// error stops the run for this page so resumption re-fetches it whole.
    async fn drain_page_comments(
        &self,
        page: &Page,
        summary: &mut CollectionSummary,
        watermark: &mut Option<DateTime<Utc>>,
    ) -> Result<(), PageFailure> {
        let issue_ids: Vec<String> = page
            .records
            .iter()
            .map(|r| r.external_id.clone())
            .collect();

        let results: Vec<(String, FetchResult<(Vec<Record>, u64)>)> = stream::iter(issue_ids)
            .map(|issue_id| async move {
                let result = self.drain_comments(&issue_id).await;
                (issue_id, result)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut stop: Option<PageFailure> = None;
        for (issue_id, result) in results {
            let (records, pages) = match result {
                Ok(drained) => drained,
                Err(e) => {
                    warn!(issue_id = %issue_id, error = %e, "Comment thread fetch failed");
                    // Keep the most severe error; a fatal one wins.
                    if stop.as_ref().map(|s| !s.is_fatal()).unwrap_or(true) {
                        stop = Some(PageFailure::Fetch(e));
                    }
                    continue;
                }
            };
            let (inserted, superseded, skipped) =
                match self.raw_store.append_page(Collection::Comments, &records) {
                    Ok(counts) => counts,
                    Err(e) => {
                        error!(issue_id = %issue_id, error = %e, "Comment records could not be persisted");
                        return Err(PageFailure::Store(e));
                    }
                };
            summary.pages += pages;
            summary.fetched += records.len() as u64;
            summary.inserted += inserted;
            summary.superseded += superseded;
            summary.skipped += skipped;
            for record in &records {
                *watermark = Checkpoint::max_watermark(*watermark, Some(record.revision.0));
            }
        }

        match stop {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Fetch every comment page for one issue.
    async fn drain_comments(&self, issue_id: &str) -> FetchResult<(Vec<Record>, u64)> {
        let mut cursor: Option<String> = None;
        let mut records = Vec::new();
        let mut pages = 0;
        loop {
            let page = self
                .client
                .fetch_comment_page(issue_id, cursor.as_deref())
                .await?;
            pages += 1;
            records.extend(page.records);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
            if pages >= MAX_PAGES {
                return Err(FetchError::InvalidCursorToken(format!(
                    "comment pagination for issue {issue_id} did not terminate"
                )));
            }
        }
        Ok((records, pages))
    }

    /// Comments-only mode: walk the issues already in the raw store and
    /// drain their threads.
    async fn sync_comments_standalone(&self) -> CollectionSummary {
        let mut summary = CollectionSummary::new(Collection::Comments);
        let mut watermark = self
            .cursor_store
            .load(Collection::Comments)
            .and_then(|cp| cp.watermark());

        let stored = match self.raw_store.current(Collection::Issues) {
            Ok(stored) => stored,
            Err(e) => {
                error!(error = %e, "Failed to read stored issues");
                summary.mark_failed(e.to_string());
                return summary;
            }
        };
        if stored.is_empty() {
            info!("No stored issues, nothing to drain");
            return summary;
        }

        let synthetic = Page {
            records: stored
                .into_iter()
                .map(|s| Record {
                    external_id: s.external_id,
                    revision: s.revision,
                    payload: s.payload,
                })
                .collect(),
            next_cursor: None,
        };
        if let Err(e) = self
            .drain_page_comments(&synthetic, &mut summary, &mut watermark)
            .await
        {
            if e.is_fatal() {
                summary.mark_failed(e.to_string());
            } else {
                summary.mark_partial(e.to_string());
            }
            return summary;
        }

        let checkpoint = Checkpoint::after_page(None, watermark, summary.pages.max(1));
        if let Err(e) = self.cursor_store.save(Collection::Comments, &checkpoint) {
            error!(error = %e, "Comments checkpoint write failed");
            summary.mark_failed(e.to_string());
        }
        summary
    }
}
