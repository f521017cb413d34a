//! Fetch collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::FetchResult;

/// Body of a successful (2xx) fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedPage {
    /// Final URL after redirects; relative links resolve against this
    pub url: String,

    /// HTTP status code
    pub status: u16,

    /// Response body
    pub body: String,
}

impl FetchedPage {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: 200,
            body: body.into(),
        }
    }
}

/// Fetches one URL.
///
/// Implementations return `FetchError::Status` for non-2xx answers so the
/// caller can decide whether to retry. Retrying itself is the caller's job.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url`, giving up after `timeout`.
    async fn fetch(&self, url: &str, timeout: Duration) -> FetchResult<FetchedPage>;

    /// Fetcher name (for logging).
    fn name(&self) -> &str {
        "unknown"
    }
}
