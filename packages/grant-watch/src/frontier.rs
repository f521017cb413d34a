//! Bounded, keyword-guided breadth-first crawling.
//!
//! The frontier owns one FIFO queue and one visited set per crawl. Pages are
//! fetched strictly one at a time with a fixed delay between fetches; a page
//! that keeps failing is recorded and the crawl moves on.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::CrawlConfig;
use crate::error::{FetchError, FetchResult, PageError};
use crate::extractor::ContentExtractor;
use crate::traits::fetcher::{FetchedPage, PageFetcher};
use crate::types::{DiscoveredLink, PageResult};

/// File extensions reported by [`CrawlFrontier::find_documents`].
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "xls", "xlsx"];

/// A page the crawl gave up on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlFailure {
    pub url: String,
    pub depth: usize,
    pub error: String,
}

/// Output of one crawl invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlReport {
    /// Successfully extracted pages in visit order; the start page first
    pub pages: Vec<PageResult>,

    /// Pages that failed after all retries
    pub failures: Vec<CrawlFailure>,
}

/// A downloadable document linked from a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLink {
    pub url: String,
    pub text: String,

    /// Lowercase file extension, or `"download"` for download endpoints
    pub kind: String,
}

/// Crawls pages through a [`PageFetcher`].
pub struct CrawlFrontier<F> {
    fetcher: F,
    extractor: ContentExtractor,
    config: CrawlConfig,
}

impl<F: PageFetcher> CrawlFrontier<F> {
    pub fn new(fetcher: F, extractor: ContentExtractor, config: CrawlConfig) -> Self {
        Self {
            fetcher,
            extractor,
            config,
        }
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    pub fn extractor(&self) -> &ContentExtractor {
        &self.extractor
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// One fetch bounded by the request timeout.
    ///
    /// Expiry becomes a retryable [`FetchError::Timeout`] even if the
    /// fetcher itself ignores the timeout.
    async fn fetch_attempt(&self, url: &str) -> FetchResult<FetchedPage> {
        let timeout = self.config.request_timeout();
        match tokio::time::timeout(timeout, self.fetcher.fetch(url, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
            }),
        }
    }

    /// Fetch with linear backoff between retryable failures.
    pub async fn fetch_with_retry(&self, url: &str) -> FetchResult<FetchedPage> {
        let mut attempt = 1;
        loop {
            match self.fetch_attempt(url).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_retryable() && attempt < self.config.max_attempts => {
                    let backoff = self.config.backoff_for(attempt);
                    warn!(
                        url = %url,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Fetch failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fetch and extract a single page.
    ///
    /// The result's `links` hold every qualifying outbound link, tagged
    /// with depth 1.
    pub async fn fetch_one(&self, url: &str) -> Result<PageResult, PageError> {
        self.fetch_page(url, 0).await
    }

    async fn fetch_page(&self, url: &str, depth: usize) -> Result<PageResult, PageError> {
        let fetched = self.fetch_with_retry(url).await?;
        let snapshot = self
            .extractor
            .extract(&fetched.body)
            .map_err(|source| PageError::Extraction {
                url: url.to_string(),
                source,
            })?;
        let links = self.relevant_links(&fetched.url, &fetched.body, depth + 1);

        debug!(
            url = %url,
            depth,
            headings = snapshot.headings.len(),
            links = links.len(),
            "Page extracted"
        );

        Ok(PageResult {
            url: url.to_string(),
            depth,
            snapshot,
            links,
            fetched_at: Utc::now(),
        })
    }

    /// Breadth-first crawl from `start_url`.
    ///
    /// Never returns more than `max_pages` pages and never fetches a URL
    /// twice, including the start URL.
    pub async fn crawl(&self, start_url: &str, max_depth: usize, max_pages: usize) -> CrawlReport {
        let mut report = CrawlReport::default();

        let start = match normalize_url(start_url) {
            Some(url) => url,
            None => {
                warn!(url = %start_url, "Invalid crawl start URL");
                report.failures.push(CrawlFailure {
                    url: start_url.to_string(),
                    depth: 0,
                    error: FetchError::InvalidUrl {
                        url: start_url.to_string(),
                    }
                    .to_string(),
                });
                return report;
            }
        };

        info!(url = %start, max_depth, max_pages, "Starting crawl");

        let mut queue: VecDeque<(String, usize)> = VecDeque::new();
        let mut queued: HashSet<String> = HashSet::new();
        let mut visited: HashSet<String> = HashSet::new();
        queue.push_back((start.clone(), 0));
        queued.insert(start);

        let mut fetched_any = false;

        while let Some((url, depth)) = queue.pop_front() {
            if report.pages.len() >= max_pages {
                break;
            }
            if !visited.insert(url.clone()) {
                continue;
            }

            // Politeness delay between sequential fetches
            if fetched_any {
                tokio::time::sleep(self.config.request_delay()).await;
            }
            fetched_any = true;

            match self.fetch_page(&url, depth).await {
                Ok(page) => {
                    if depth < max_depth {
                        let mut enqueued = 0;
                        for link in &page.links {
                            if enqueued >= self.config.fan_out {
                                break;
                            }
                            if visited.contains(&link.url) || !queued.insert(link.url.clone()) {
                                continue;
                            }
                            queue.push_back((link.url.clone(), depth + 1));
                            enqueued += 1;
                        }
                    }
                    report.pages.push(page);
                }
                Err(e) => {
                    warn!(url = %url, depth, error = %e, "Page failed");
                    report.failures.push(CrawlFailure {
                        url,
                        depth,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            pages = report.pages.len(),
            failures = report.failures.len(),
            "Crawl complete"
        );

        report
    }

    /// Downloadable documents linked from one page.
    pub async fn find_documents(&self, url: &str) -> FetchResult<Vec<DocumentLink>> {
        let fetched = self.fetch_with_retry(url).await?;
        let base = Url::parse(&fetched.url).map_err(|_| FetchError::InvalidUrl {
            url: fetched.url.clone(),
        })?;

        let mut seen = HashSet::new();
        let mut documents = Vec::new();

        for anchor in self.extractor.anchors(&fetched.body) {
            let href = anchor.href.to_lowercase();
            let kind = match document_kind(&href) {
                Some(kind) => kind,
                None => continue,
            };
            let Ok(resolved) = base.join(&anchor.href) else {
                continue;
            };
            if !seen.insert(resolved.to_string()) {
                continue;
            }

            documents.push(DocumentLink {
                url: resolved.to_string(),
                text: if anchor.text.is_empty() {
                    "Document".to_string()
                } else {
                    anchor.text
                },
                kind,
            });
        }

        info!(url = %url, documents = documents.len(), "Documents found");
        Ok(documents)
    }

    /// Outbound links on a page worth following.
    ///
    /// A link qualifies when it is HTTP(S), stays on the page's domain or a
    /// subdomain, is not a static asset, and its text or href mentions a
    /// link keyword. Relative hrefs resolve against `page_url`.
    pub fn relevant_links(&self, page_url: &str, html: &str, depth: usize) -> Vec<DiscoveredLink> {
        let Ok(base) = Url::parse(page_url) else {
            return Vec::new();
        };
        let base_host = base.host_str().unwrap_or("").to_lowercase();
        let own_url = normalize_url(page_url);

        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for anchor in self.extractor.anchors(html) {
            let href = anchor.href.trim();

            // Skip anchors, javascript, mailto
            if href.starts_with('#')
                || href.starts_with("javascript:")
                || href.starts_with("mailto:")
                || href.starts_with("tel:")
            {
                continue;
            }

            let Ok(mut resolved) = base.join(href) else {
                debug!(href = %href, "Dropping malformed link");
                continue;
            };
            resolved.set_fragment(None);

            if !matches!(resolved.scheme(), "http" | "https") {
                continue;
            }
            let host = resolved.host_str().unwrap_or("").to_lowercase();
            if !same_site(&host, &base_host) {
                continue;
            }
            if self.is_excluded_asset(&resolved) {
                continue;
            }
            if !self
                .extractor
                .relevance()
                .is_relevant_link(&anchor.text, href)
            {
                continue;
            }

            let url = resolved.to_string();
            if own_url.as_deref() == Some(url.as_str()) || !seen.insert(url.clone()) {
                continue;
            }

            links.push(DiscoveredLink {
                url,
                text: anchor.text,
                depth,
            });
        }

        links
    }

    fn is_excluded_asset(&self, url: &Url) -> bool {
        let path = url.path().to_lowercase();
        self.config
            .excluded_extensions
            .iter()
            .any(|ext| path.ends_with(&format!(".{}", ext)))
    }
}

/// Parse and strip the fragment; `None` for unparseable or non-HTTP URLs.
fn normalize_url(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

/// Same host, a subdomain of it, or a parent domain of it.
fn same_site(host: &str, base_host: &str) -> bool {
    if host.is_empty() || base_host.is_empty() {
        return false;
    }
    host == base_host
        || host.ends_with(&format!(".{}", base_host))
        || base_host.ends_with(&format!(".{}", host))
}

fn document_kind(lowercase_href: &str) -> Option<String> {
    let path = lowercase_href
        .split(['?', '#'])
        .next()
        .unwrap_or(lowercase_href);
    for ext in DOCUMENT_EXTENSIONS {
        if path.ends_with(&format!(".{}", ext)) {
            return Some(ext.to_string());
        }
    }
    if lowercase_href.contains("download") {
        return Some("download".to_string());
    }
    None
}
