//! Configuration for extraction, detection, crawling and monitoring.
//!
//! Every component takes its configuration at construction. Nothing is
//! read from globals; the binary assembles these from the environment via
//! [`AppConfig::from_env`].

use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Domain vocabulary used to separate signal from boilerplate.
///
/// Matching is case-insensitive substring matching, so `"beca"` also
/// matches `"Becas 2025"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordConfig {
    /// Keywords that make an anchor (text or href) relevant
    pub link_keywords: Vec<String>,

    /// Keywords a heading must contain for its churn to be reported
    pub heading_keywords: Vec<String>,

    /// Keywords that must occur near a date for the date to be kept
    pub date_context_keywords: Vec<String>,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            link_keywords: words(&[
                "convocatoria",
                "ayuda",
                "subvencion",
                "subvención",
                "beca",
                "financiacion",
                "financiación",
                "programa",
                "solicitud",
                "bases",
                "requisitos",
                "plazo",
                "grant",
                "subsidy",
                "deadline",
                "application",
            ]),
            heading_keywords: words(&[
                "convocatoria",
                "ayuda",
                "subvencion",
                "subvención",
                "beca",
                "financiacion",
                "financiación",
                "programa",
                "plazo",
                "grant",
                "funding",
            ]),
            date_context_keywords: words(&[
                "plazo",
                "convocatoria",
                "solicitud",
                "presentación",
                "presentacion",
                "deadline",
                "hasta",
            ]),
        }
    }
}

impl KeywordConfig {
    /// Create the default grant vocabulary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the link keywords.
    pub fn with_link_keywords(mut self, keywords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.link_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the heading keywords.
    pub fn with_heading_keywords(
        mut self,
        keywords: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.heading_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the date context keywords.
    pub fn with_date_context_keywords(
        mut self,
        keywords: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.date_context_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

/// Configuration for [`crate::ContentExtractor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Lines containing any of these (lowercased) are dropped as tracking noise
    pub boilerplate_markers: Vec<String>,

    /// Lines shorter than this many characters are dropped
    pub min_line_chars: usize,

    /// Characters on each side of a date searched for a context keyword
    pub date_context_radius: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            boilerplate_markers: words(&[
                "javascript",
                "jquery",
                "cookie",
                "analytics",
                "gtm",
                "datalayer",
            ]),
            min_line_chars: 3,
            date_context_radius: 100,
        }
    }
}

impl ExtractorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_line_chars(mut self, chars: usize) -> Self {
        self.min_line_chars = chars;
        self
    }

    pub fn with_date_context_radius(mut self, radius: usize) -> Self {
        self.date_context_radius = radius;
        self
    }
}

/// Configuration for [`crate::ChangeDetector`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Similarity below which a `content_change` corroborates structural changes.
    ///
    /// Default: 0.5.
    pub content_similarity_threshold: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            content_similarity_threshold: 0.5,
        }
    }
}

impl DetectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the content similarity threshold.
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.content_similarity_threshold = threshold;
        self
    }
}

/// Configuration for [`crate::CrawlFrontier`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Maximum link depth from the start page (0 = start page only)
    pub max_depth: usize,

    /// Maximum number of pages returned by one crawl
    pub max_pages: usize,

    /// Maximum qualifying links enqueued per page
    pub fan_out: usize,

    /// Delay between sequential fetches in milliseconds
    pub request_delay_ms: u64,

    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Attempts per page before it is recorded as failed
    pub max_attempts: u32,

    /// Base retry backoff in milliseconds; attempt `n` waits `n * base`
    pub retry_backoff_ms: u64,

    /// Path extensions never followed (images, styles, scripts, fonts)
    pub excluded_extensions: Vec<String>,

    /// User agent sent by the HTTP fetcher
    pub user_agent: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_pages: 30,
            fan_out: 10,
            request_delay_ms: 2000,
            request_timeout_ms: 30_000,
            max_attempts: 3,
            retry_backoff_ms: 2000,
            excluded_extensions: words(&[
                "jpg", "jpeg", "png", "gif", "svg", "webp", "css", "js", "ico", "woff", "woff2",
                "ttf",
            ]),
            user_agent: "GrantWatch/1.0 (Mozilla/5.0 compatible)".to_string(),
        }
    }
}

impl CrawlConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum depth.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set maximum pages.
    pub fn with_max_pages(mut self, max: usize) -> Self {
        self.max_pages = max;
        self
    }

    /// Set per-page fan-out.
    pub fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out;
        self
    }

    /// Set the delay between sequential fetches.
    pub fn with_request_delay_ms(mut self, ms: u64) -> Self {
        self.request_delay_ms = ms;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout_ms(mut self, ms: u64) -> Self {
        self.request_timeout_ms = ms;
        self
    }

    /// Set retry attempts and base backoff.
    pub fn with_retries(mut self, max_attempts: u32, backoff_ms: u64) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_backoff_ms = backoff_ms;
        self
    }

    /// Set the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Backoff to wait after failed attempt number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Configuration for [`crate::MonitoringCycle`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Crawl each source with the frontier instead of a single fetch
    pub deep_crawl: bool,

    /// Delay before each source check in milliseconds
    pub source_delay_ms: u64,

    /// Relevant links registered as sublinks per source check
    pub max_new_sublinks: usize,

    /// Also check due sublinks after the sources
    pub include_sublinks: bool,

    /// Sublinks checked per run
    pub max_sublinks: usize,

    /// Sublinks checked per parent source per run
    pub max_sublinks_per_source: usize,

    /// Links registered from a sublink page per check
    pub nested_sublink_limit: usize,

    /// Sublinks at this depth do not register further sublinks
    pub max_sublink_depth: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            deep_crawl: false,
            source_delay_ms: 1500,
            max_new_sublinks: 10,
            include_sublinks: true,
            max_sublinks: 30,
            max_sublinks_per_source: 5,
            nested_sublink_limit: 5,
            max_sublink_depth: 3,
        }
    }
}

impl MonitorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable deep crawling of sources.
    pub fn with_deep_crawl(mut self, deep: bool) -> Self {
        self.deep_crawl = deep;
        self
    }

    /// Set the delay before each source check.
    pub fn with_source_delay_ms(mut self, ms: u64) -> Self {
        self.source_delay_ms = ms;
        self
    }

    /// Enable or disable sublink checks.
    pub fn with_sublinks(mut self, include: bool) -> Self {
        self.include_sublinks = include;
        self
    }

    /// Set sublink limits per run and per parent.
    pub fn with_sublink_limits(mut self, total: usize, per_source: usize) -> Self {
        self.max_sublinks = total;
        self.max_sublinks_per_source = per_source;
        self
    }

    pub fn source_delay(&self) -> Duration {
        Duration::from_millis(self.source_delay_ms)
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub ollama_url: Option<String>,
    pub ollama_model: String,
    pub keywords: KeywordConfig,
    pub crawl: CrawlConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let mut keywords = KeywordConfig::default();
        if let Ok(list) = env::var("GRANT_WATCH_KEYWORDS") {
            let custom = parse_keyword_list(&list);
            if !custom.is_empty() {
                keywords = keywords
                    .with_link_keywords(custom.clone())
                    .with_heading_keywords(custom);
            }
        }

        let mut crawl = CrawlConfig::default();
        if let Ok(delay) = env::var("CRAWL_DELAY_MS") {
            crawl.request_delay_ms = delay
                .parse()
                .context("CRAWL_DELAY_MS must be a valid number")?;
        }
        if let Ok(timeout) = env::var("REQUEST_TIMEOUT_MS") {
            crawl.request_timeout_ms = timeout
                .parse()
                .context("REQUEST_TIMEOUT_MS must be a valid number")?;
        }
        if let Ok(user_agent) = env::var("USER_AGENT") {
            crawl.user_agent = user_agent;
        }

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://grant-watch.db?mode=rwc".to_string()),
            ollama_url: env::var("OLLAMA_URL").ok().filter(|u| !u.trim().is_empty()),
            ollama_model: env::var("OLLAMA_MODEL")
                .unwrap_or_else(|_| "llama3.1:latest".to_string()),
            keywords,
            crawl,
        })
    }
}

/// Split a comma-separated keyword list, dropping blanks.
fn parse_keyword_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}
