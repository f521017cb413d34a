//! Testing utilities including mock collaborators.
//!
//! These let applications and tests drive crawls and monitoring cycles
//! without network access or a running summary service.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{FetchError, FetchResult, SummaryError};
use crate::traits::fetcher::{FetchedPage, PageFetcher};
use crate::traits::summarizer::{ChangeAnalysis, ChangeSummarizer};
use crate::types::{ChangeEvent, Priority};

/// A scripted fetch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Timeout,
    Status(u16),
    InvalidUrl,
}

impl MockFailure {
    fn into_error(self, url: &str) -> FetchError {
        let url = url.to_string();
        match self {
            MockFailure::Timeout => FetchError::Timeout { url },
            MockFailure::Status(status) => FetchError::Status { url, status },
            MockFailure::InvalidUrl => FetchError::InvalidUrl { url },
        }
    }
}

/// Mock fetcher serving canned pages.
///
/// Unknown URLs answer with a 404. Scripted failures for a URL are
/// consumed one per fetch before the canned page is served, which makes
/// retry behavior easy to exercise.
///
/// Clones share state, so a test can keep a handle while the frontier owns
/// another.
#[derive(Default, Clone)]
pub struct MockFetcher {
    pages: Arc<RwLock<HashMap<String, FetchedPage>>>,
    failures: Arc<RwLock<HashMap<String, VecDeque<MockFailure>>>>,
    calls: Arc<RwLock<Vec<String>>>,
    call_times: Arc<RwLock<Vec<Instant>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url` (replacing any previous page).
    pub fn set_page(&self, url: impl Into<String>, body: impl Into<String>) {
        let url = url.into();
        let page = FetchedPage::new(url.clone(), body);
        self.pages.write().unwrap().insert(url, page);
    }

    /// Serve `body` for `url` as if redirected to `final_url`.
    pub fn set_redirect(
        &self,
        url: impl Into<String>,
        final_url: impl Into<String>,
        body: impl Into<String>,
    ) {
        let page = FetchedPage::new(final_url, body);
        self.pages.write().unwrap().insert(url.into(), page);
    }

    /// Stop serving `url`.
    pub fn remove_page(&self, url: &str) {
        self.pages.write().unwrap().remove(url);
    }

    /// Queue a failure for the next fetch of `url`.
    pub fn push_failure(&self, url: impl Into<String>, failure: MockFailure) {
        self.failures
            .write()
            .unwrap()
            .entry(url.into())
            .or_default()
            .push_back(failure);
    }

    /// Builder form of [`MockFetcher::set_page`].
    pub fn with_page(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.set_page(url, body);
        self
    }

    /// Builder form of [`MockFetcher::push_failure`].
    pub fn with_failure(self, url: impl Into<String>, failure: MockFailure) -> Self {
        self.push_failure(url, failure);
        self
    }

    /// URLs fetched so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    /// Number of fetches of `url`.
    pub fn call_count(&self, url: &str) -> usize {
        self.calls.read().unwrap().iter().filter(|u| *u == url).count()
    }

    /// When each fetch started, in call order.
    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.read().unwrap().clone()
    }

    pub fn reset_calls(&self) {
        self.calls.write().unwrap().clear();
        self.call_times.write().unwrap().clear();
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> FetchResult<FetchedPage> {
        self.calls.write().unwrap().push(url.to_string());
        self.call_times.write().unwrap().push(Instant::now());

        let scripted = self
            .failures
            .write()
            .unwrap()
            .get_mut(url)
            .and_then(|queue| queue.pop_front());
        if let Some(failure) = scripted {
            return Err(failure.into_error(url));
        }

        self.pages
            .read()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Record of a call made to the mock summarizer.
#[derive(Debug, Clone, PartialEq)]
pub struct MockSummarizerCall {
    pub source_name: String,
    pub event_count: usize,
}

/// Mock summary service.
///
/// Answers with a fixed analysis, or fails when marked unavailable or
/// failing.
#[derive(Clone)]
pub struct MockSummarizer {
    available: bool,
    fail: bool,
    analysis: ChangeAnalysis,
    calls: Arc<RwLock<Vec<MockSummarizerCall>>>,
}

impl Default for MockSummarizer {
    fn default() -> Self {
        Self {
            available: true,
            fail: false,
            analysis: ChangeAnalysis {
                summary: "Nueva convocatoria publicada".to_string(),
                priority: Priority::Urgent,
                keywords: vec!["convocatoria".to_string()],
                ai_generated: true,
            },
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl MockSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A summarizer whose health probe fails.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::default()
        }
    }

    /// A summarizer that is reachable but errors on every request.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Set the analysis returned on success.
    pub fn with_analysis(mut self, analysis: ChangeAnalysis) -> Self {
        self.analysis = analysis;
        self
    }

    pub fn calls(&self) -> Vec<MockSummarizerCall> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl ChangeSummarizer for MockSummarizer {
    async fn is_available(&self) -> bool {
        self.available
    }

    async fn summarize(
        &self,
        events: &[ChangeEvent],
        source_name: &str,
    ) -> Result<ChangeAnalysis, SummaryError> {
        self.calls.write().unwrap().push(MockSummarizerCall {
            source_name: source_name.to_string(),
            event_count: events.len(),
        });

        if !self.available {
            return Err(SummaryError::Unavailable("mock unavailable".to_string()));
        }
        if self.fail {
            return Err(SummaryError::InvalidResponse("mock failure".to_string()));
        }
        Ok(self.analysis.clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
