//! The monitoring cycle.
//!
//! One run checks every enabled source in turn, compares the fresh snapshot
//! with the stored one, appends change records, registers newly discovered
//! sublinks, and then checks a bounded batch of due sublinks the same way.
//! A failing source or sublink is recorded as `error` and the run moves on;
//! [`MonitoringCycle::run`] itself never fails.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::MonitorConfig;
use crate::detector::ChangeDetector;
use crate::error::{MonitorError, PageError};
use crate::frontier::CrawlFrontier;
use crate::summarizer::analyze_changes;
use crate::traits::fetcher::PageFetcher;
use crate::traits::store::SourceStore;
use crate::traits::summarizer::{ChangeAnalysis, ChangeSummarizer};
use crate::types::{
    ChangeEvent, ChangeRecord, CheckUpdate, MonitoredSource, PageResult, PageSnapshot,
    ReviewStatus, SourceStatus, Sublink, SublinkStatus,
};

/// Totals for one monitoring run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Sources attempted
    pub checked: usize,

    /// Sources whose content changed
    pub changes: usize,

    /// Sources that failed
    pub errors: usize,

    /// Sublinks registered during the run
    pub new_sublinks: usize,

    pub sublinks_checked: usize,
    pub sublinks_changed: usize,
    pub sublink_errors: usize,

    pub elapsed_ms: u64,
}

/// Outcome of checking one source or sublink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub url: String,

    /// Whether the stored content differed from the fetched content
    pub changed: bool,

    /// Change records appended
    pub records: usize,

    /// Sublinks newly registered from this page
    pub new_sublinks: usize,
}

/// A link found on a checked page that may become a sublink.
struct Candidate {
    url: String,
    text: String,
    depth: u32,
}

fn sublink_depth(depth: usize) -> u32 {
    u32::try_from(depth).unwrap_or(u32::MAX)
}

/// What comparing a fresh snapshot against stored state produced.
struct Comparison {
    changed: bool,
    events: Vec<ChangeEvent>,
}

/// Runs monitoring passes over the sources in a [`SourceStore`].
pub struct MonitoringCycle<F, S> {
    frontier: CrawlFrontier<F>,
    detector: ChangeDetector,
    store: S,
    summarizer: Option<Box<dyn ChangeSummarizer>>,
    config: MonitorConfig,
}

impl<F: PageFetcher, S: SourceStore> MonitoringCycle<F, S> {
    pub fn new(
        frontier: CrawlFrontier<F>,
        detector: ChangeDetector,
        store: S,
        config: MonitorConfig,
    ) -> Self {
        Self {
            frontier,
            detector,
            store,
            summarizer: None,
            config,
        }
    }

    /// Use an AI summarizer for change analysis.
    pub fn with_summarizer(mut self, summarizer: Box<dyn ChangeSummarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn frontier(&self) -> &CrawlFrontier<F> {
        &self.frontier
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Check all enabled sources, then due sublinks.
    pub async fn run(&self) -> RunSummary {
        let start = Instant::now();
        let mut summary = RunSummary::default();

        let sources = match self.store.list_sources(true).await {
            Ok(sources) => sources,
            Err(e) => {
                error!(error = %e, "Failed to load sources");
                summary.errors += 1;
                summary.elapsed_ms = start.elapsed().as_millis() as u64;
                return summary;
            }
        };

        info!(
            sources = sources.len(),
            deep_crawl = self.config.deep_crawl,
            "Starting monitoring run"
        );

        for (i, source) in sources.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.source_delay()).await;
            }
            summary.checked += 1;

            match self.check_source(source).await {
                Ok(outcome) => {
                    if outcome.changed {
                        summary.changes += 1;
                    }
                    summary.new_sublinks += outcome.new_sublinks;
                }
                Err(e) => {
                    warn!(source = %source.name, url = %source.url, error = %e, "Source check failed");
                    summary.errors += 1;
                    if let Err(store_err) = self
                        .store
                        .record_source_check(
                            source.id,
                            SourceStatus::Error,
                            &CheckUpdate::failure(e.to_string()),
                        )
                        .await
                    {
                        error!(source = %source.name, error = %store_err, "Failed to record source error");
                    }
                }
            }
        }

        if self.config.include_sublinks {
            self.check_due_sublinks(&mut summary).await;
        }

        summary.elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            checked = summary.checked,
            changes = summary.changes,
            errors = summary.errors,
            new_sublinks = summary.new_sublinks,
            sublinks_checked = summary.sublinks_checked,
            sublinks_changed = summary.sublinks_changed,
            sublink_errors = summary.sublink_errors,
            elapsed_ms = summary.elapsed_ms,
            "Monitoring run complete"
        );

        summary
    }

    /// Check a single source and persist the result.
    ///
    /// Fetch failures are returned to the caller; an unextractable page
    /// keeps the stored snapshot and counts as unchanged. Change records
    /// are appended before the new snapshot is stored, so a failed append
    /// is detected again on the next run.
    pub async fn check_source(&self, source: &MonitoredSource) -> Result<CheckOutcome, MonitorError> {
        let fetched = if self.config.deep_crawl {
            self.crawl_source(source).await
        } else {
            self.fetch_source(source).await
        };

        let (page, candidates) = match fetched {
            Ok(fetched) => fetched,
            Err(MonitorError::Page(PageError::Extraction { url, source: e })) => {
                warn!(url = %url, error = %e, "Page could not be extracted, keeping stored snapshot");
                self.store
                    .record_source_check(source.id, SourceStatus::Unchanged, &CheckUpdate::keep_previous())
                    .await?;
                return Ok(CheckOutcome {
                    url: source.url.clone(),
                    changed: false,
                    records: 0,
                    new_sublinks: 0,
                });
            }
            Err(e) => return Err(e),
        };

        let comparison = self.compare(
            source.previous_snapshot.as_ref(),
            source.previous_hash.as_deref(),
            &page.snapshot,
        );
        let status = if comparison.changed {
            SourceStatus::Updated
        } else {
            SourceStatus::Unchanged
        };

        let records = if comparison.events.is_empty() {
            0
        } else {
            let analysis = analyze_changes(self.summarizer.as_deref(), &comparison.events, &source.name).await;
            let context = RecordContext {
                source,
                sublink_id: None,
                source_name: source.name.clone(),
                page_url: &source.url,
                old_hash: source.previous_hash.clone(),
                new_hash: &page.snapshot.raw_hash,
                review_status: ReviewStatus::Relevant,
            };
            self.append_records(&context, &comparison.events, &analysis).await?
        };

        // Stored last: a failed append leaves the previous snapshot for the next run
        self.store
            .record_source_check(source.id, status, &CheckUpdate::success(page.snapshot.clone()))
            .await?;

        let mut new_sublinks = 0;
        for candidate in candidates.into_iter().take(self.config.max_new_sublinks) {
            match self
                .store
                .upsert_sublink(source.id, &candidate.url, &candidate.text, candidate.depth)
                .await
            {
                Ok(upsert) if upsert.is_created() => {
                    debug!(url = %candidate.url, "New sublink registered");
                    new_sublinks += 1;
                }
                Ok(_) => {}
                Err(e) => warn!(url = %candidate.url, error = %e, "Failed to register sublink"),
            }
        }

        info!(
            source = %source.name,
            status = status.as_str(),
            events = comparison.events.len(),
            new_sublinks,
            "Source checked"
        );

        Ok(CheckOutcome {
            url: source.url.clone(),
            changed: comparison.changed,
            records,
            new_sublinks,
        })
    }

    /// Fetch a source page; its relevant links are the candidates.
    async fn fetch_source(
        &self,
        source: &MonitoredSource,
    ) -> Result<(PageResult, Vec<Candidate>), MonitorError> {
        let page = self.frontier.fetch_one(&source.url).await?;
        let candidates = page
            .links
            .iter()
            .map(|link| Candidate {
                url: link.url.clone(),
                text: link.text.clone(),
                depth: sublink_depth(link.depth),
            })
            .collect();
        Ok((page, candidates))
    }

    /// Crawl a source; the start page is the result, the rest are candidates.
    async fn crawl_source(
        &self,
        source: &MonitoredSource,
    ) -> Result<(PageResult, Vec<Candidate>), MonitorError> {
        let crawl = self.frontier.config();
        let report = self
            .frontier
            .crawl(&source.url, crawl.max_depth, crawl.max_pages)
            .await;

        let mut pages = report.pages.into_iter();
        let first = match pages.next() {
            Some(first) if first.depth == 0 => first,
            _ => {
                let reason = report
                    .failures
                    .iter()
                    .find(|f| f.depth == 0)
                    .map(|f| f.error.clone())
                    .unwrap_or_else(|| "start page not crawled".to_string());
                return Err(MonitorError::Crawl {
                    url: source.url.clone(),
                    reason,
                });
            }
        };

        let rest: Vec<PageResult> = pages.collect();

        // Anchor text that led to each crawled page
        let mut anchor_text: HashMap<&str, &str> = HashMap::new();
        for link in first.links.iter().chain(rest.iter().flat_map(|p| p.links.iter())) {
            anchor_text.entry(link.url.as_str()).or_insert(link.text.as_str());
        }

        let candidates = rest
            .iter()
            .map(|page| Candidate {
                url: page.url.clone(),
                text: page
                    .label()
                    .or_else(|| anchor_text.get(page.url.as_str()).copied())
                    .filter(|t| !t.is_empty())
                    .unwrap_or("Sublink")
                    .to_string(),
                depth: sublink_depth(page.depth),
            })
            .collect();

        Ok((first, candidates))
    }

    /// Compare a fresh snapshot with whatever history is stored.
    fn compare(
        &self,
        previous_snapshot: Option<&PageSnapshot>,
        previous_hash: Option<&str>,
        current: &PageSnapshot,
    ) -> Comparison {
        match (previous_snapshot, previous_hash) {
            (Some(previous), _) => {
                let result = self.detector.detect(previous, current);
                Comparison {
                    changed: result.has_changes,
                    events: result.events,
                }
            }
            // Only a digest is stored: report the change without details
            (None, Some(hash)) => Comparison {
                changed: hash != current.raw_hash,
                events: Vec::new(),
            },
            (None, None) => {
                debug!("First observation, storing baseline");
                Comparison {
                    changed: false,
                    events: Vec::new(),
                }
            }
        }
    }

    async fn append_records(
        &self,
        context: &RecordContext<'_>,
        events: &[ChangeEvent],
        analysis: &ChangeAnalysis,
    ) -> Result<usize, MonitorError> {
        for event in events {
            let record = context.record(event, analysis);
            self.store.append_change(&record).await?;
        }

        info!(
            source = %context.source_name,
            summary = %analysis.summary,
            priority = analysis.priority.as_str(),
            ai_generated = analysis.ai_generated,
            "Changes recorded"
        );
        Ok(events.len())
    }

    async fn check_due_sublinks(&self, summary: &mut RunSummary) {
        let due = match self
            .store
            .sublinks_due(self.config.max_sublinks, self.config.max_sublinks_per_source)
            .await
        {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "Failed to load due sublinks");
                summary.sublink_errors += 1;
                return;
            }
        };

        info!(sublinks = due.len(), "Checking sublinks");

        let mut parents: HashMap<Uuid, MonitoredSource> = HashMap::new();
        for (i, sublink) in due.iter().enumerate() {
            if !parents.contains_key(&sublink.parent_source_id) {
                match self.store.get_source(sublink.parent_source_id).await {
                    Ok(Some(parent)) => {
                        parents.insert(parent.id, parent);
                    }
                    Ok(None) => {
                        warn!(url = %sublink.url, "Sublink parent no longer exists, skipping");
                        continue;
                    }
                    Err(e) => {
                        warn!(url = %sublink.url, error = %e, "Failed to load sublink parent");
                        summary.sublink_errors += 1;
                        continue;
                    }
                }
            }
            let Some(parent) = parents.get(&sublink.parent_source_id) else {
                continue;
            };

            if i > 0 {
                tokio::time::sleep(self.frontier.config().request_delay()).await;
            }
            summary.sublinks_checked += 1;

            match self.check_sublink(sublink, parent).await {
                Ok(outcome) => {
                    if outcome.changed {
                        summary.sublinks_changed += 1;
                    }
                    summary.new_sublinks += outcome.new_sublinks;
                }
                Err(e) => {
                    warn!(url = %sublink.url, error = %e, "Sublink check failed");
                    summary.sublink_errors += 1;
                    if let Err(store_err) = self
                        .store
                        .record_sublink_check(
                            sublink.id,
                            SublinkStatus::Error,
                            &CheckUpdate::failure(e.to_string()),
                        )
                        .await
                    {
                        error!(url = %sublink.url, error = %store_err, "Failed to record sublink error");
                    }
                }
            }
        }
    }

    /// Check one sublink against its own stored snapshot.
    pub async fn check_sublink(
        &self,
        sublink: &Sublink,
        parent: &MonitoredSource,
    ) -> Result<CheckOutcome, MonitorError> {
        let page = match self.frontier.fetch_one(&sublink.url).await {
            Ok(page) => page,
            Err(PageError::Extraction { url, source }) => {
                warn!(url = %url, error = %source, "Sublink could not be extracted, keeping stored snapshot");
                self.store
                    .record_sublink_check(sublink.id, SublinkStatus::Active, &CheckUpdate::keep_previous())
                    .await?;
                return Ok(CheckOutcome {
                    url: sublink.url.clone(),
                    changed: false,
                    records: 0,
                    new_sublinks: 0,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let comparison = self.compare(
            sublink.previous_snapshot.as_ref(),
            sublink.previous_hash.as_deref(),
            &page.snapshot,
        );

        let source_name = format!("{} - {}", parent.name, sublink.link_text);
        let records = if comparison.events.is_empty() {
            0
        } else {
            let analysis = analyze_changes(self.summarizer.as_deref(), &comparison.events, &source_name).await;
            let context = RecordContext {
                source: parent,
                sublink_id: Some(sublink.id),
                source_name,
                page_url: &sublink.url,
                old_hash: sublink.previous_hash.clone(),
                new_hash: &page.snapshot.raw_hash,
                review_status: ReviewStatus::Pending,
            };
            self.append_records(&context, &comparison.events, &analysis).await?
        };

        self.store
            .record_sublink_check(sublink.id, SublinkStatus::Active, &CheckUpdate::success(page.snapshot.clone()))
            .await?;

        let mut new_sublinks = 0;
        if sublink.depth < self.config.max_sublink_depth {
            let nested = page
                .links
                .iter()
                .filter(|link| link.url != parent.url)
                .take(self.config.nested_sublink_limit);
            for link in nested {
                match self
                    .store
                    .upsert_sublink(parent.id, &link.url, &link.text, sublink.depth + 1)
                    .await
                {
                    Ok(upsert) if upsert.is_created() => new_sublinks += 1,
                    Ok(_) => {}
                    Err(e) => warn!(url = %link.url, error = %e, "Failed to register nested sublink"),
                }
            }
        }

        debug!(
            url = %sublink.url,
            changed = comparison.changed,
            events = comparison.events.len(),
            new_sublinks,
            "Sublink checked"
        );

        Ok(CheckOutcome {
            url: sublink.url.clone(),
            changed: comparison.changed,
            records,
            new_sublinks,
        })
    }
}

/// Fields shared by every record appended for one page check.
struct RecordContext<'a> {
    source: &'a MonitoredSource,
    sublink_id: Option<Uuid>,
    source_name: String,
    page_url: &'a str,
    old_hash: Option<String>,
    new_hash: &'a str,
    review_status: ReviewStatus,
}

impl RecordContext<'_> {
    fn record(&self, event: &ChangeEvent, analysis: &ChangeAnalysis) -> ChangeRecord {
        let mut description = event.describe();
        if analysis.ai_generated {
            description.push_str("\n\nAI analysis: ");
            description.push_str(&analysis.summary);
        }

        ChangeRecord {
            id: Uuid::new_v4(),
            source_id: self.source.id,
            sublink_id: self.sublink_id,
            url: event.target_url(self.page_url),
            change_type: event.kind(),
            old_hash: self.old_hash.clone(),
            new_hash: self.new_hash.to_string(),
            source_kind: self.source.kind,
            source_name: self.source_name.clone(),
            description,
            priority: event.priority,
            review_status: self.review_status,
            event: event.clone(),
            created_at: Utc::now(),
        }
    }
}
