//! Grant Page Change Monitoring Library
//!
//! Watches public grant, subsidy and funding pages and reports meaningful
//! changes: new calls for applications, new funding programs, moved
//! deadlines. Cosmetic churn (tracking scripts, reordered boilerplate,
//! whitespace) is filtered out.
//!
//! # Pipeline
//!
//! 1. [`ContentExtractor`] reduces raw HTML to a [`PageSnapshot`].
//! 2. [`ChangeDetector`] diffs two snapshots into prioritized [`ChangeEvent`]s.
//! 3. [`CrawlFrontier`] fetches pages with retry and explores same-site,
//!    keyword-relevant links breadth-first.
//! 4. [`MonitoringCycle`] runs all of the above over the sources in a
//!    [`SourceStore`], appending change records and registering sublinks.
//!
//! # Usage
//!
//! ```rust,ignore
//! use grant_watch::{
//!     ChangeDetector, ContentExtractor, CrawlConfig, CrawlFrontier, HttpFetcher,
//!     MemoryStore, MonitorConfig, MonitoringCycle,
//! };
//!
//! let crawl = CrawlConfig::default();
//! let frontier = CrawlFrontier::new(HttpFetcher::new(&crawl), ContentExtractor::default(), crawl);
//! let cycle = MonitoringCycle::new(
//!     frontier,
//!     ChangeDetector::default(),
//!     MemoryStore::new(),
//!     MonitorConfig::default(),
//! );
//!
//! let summary = cycle.run().await;
//! println!("{} sources checked, {} changed", summary.checked, summary.changes);
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Collaborator seams (fetching, storage, AI summaries)
//! - [`types`] - Snapshots, change events, sources and sublinks
//! - [`fetchers`] - HTTP fetcher
//! - [`stores`] - Storage implementations (MemoryStore, SqliteStore)
//! - [`summarizer`] - Ollama summarizer and deterministic fallback
//! - [`testing`] - Mock implementations for testing

pub mod config;
pub mod detector;
pub mod error;
pub mod extractor;
pub mod fetchers;
pub mod frontier;
pub mod monitor;
pub mod relevance;
pub mod similarity;
pub mod stores;
pub mod summarizer;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use config::{
    AppConfig, CrawlConfig, DetectorConfig, ExtractorConfig, KeywordConfig, MonitorConfig,
};
pub use detector::ChangeDetector;
pub use error::{
    ExtractionError, FetchError, FetchResult, MonitorError, PageError, StoreError, StoreResult,
    SummaryError,
};
pub use extractor::ContentExtractor;
pub use frontier::{CrawlFailure, CrawlFrontier, CrawlReport, DocumentLink};
pub use monitor::{CheckOutcome, MonitoringCycle, RunSummary};
pub use relevance::RelevanceFilter;
pub use similarity::similarity;
pub use traits::{
    fetcher::{FetchedPage, PageFetcher},
    store::SourceStore,
    summarizer::{ChangeAnalysis, ChangeSummarizer},
};
pub use types::{
    Change, ChangeEvent, ChangeKind, ChangeRecord, CheckUpdate, DetectionResult, DiscoveredLink,
    MonitoredSource, PageLink, PageResult, PageSnapshot, Priority, ReviewStatus, SourceKind,
    SourceStatus, Sublink, SublinkStatus, SublinkUpsert,
};

// Re-export implementations
pub use fetchers::HttpFetcher;
pub use stores::{MemoryStore, SqliteStore};
pub use summarizer::{analyze_changes, basic_analysis, OllamaSummarizer};
