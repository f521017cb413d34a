//! Typed errors for the monitoring library.
//!
//! Every failure is local to one page or one source. The crawl and
//! monitoring loops turn these into per-page / per-source status instead of
//! aborting the run.

use thiserror::Error;

/// Errors raised at the fetch boundary.
#[derive(Debug, Error)]
pub enum FetchError {
    /// URL could not be parsed or uses a non-HTTP scheme
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Request did not complete within the per-request timeout
    #[error("timeout fetching: {url}")]
    Timeout { url: String },

    /// Server answered with a non-2xx status
    #[error("HTTP {status} fetching: {url}")]
    Status { url: String, status: u16 },

    /// Transport-level failure (DNS, TLS, connection reset, body read)
    #[error("HTTP error fetching {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::InvalidUrl { .. } => false,
            FetchError::Timeout { .. } | FetchError::Http { .. } => true,
            FetchError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
        }
    }

    /// URL the failed request was for.
    pub fn url(&self) -> &str {
        match self {
            FetchError::InvalidUrl { url }
            | FetchError::Timeout { url }
            | FetchError::Status { url, .. }
            | FetchError::Http { url, .. } => url,
        }
    }
}

/// Markup that cannot be reduced to a usable snapshot.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    /// Body is empty or whitespace only
    #[error("document is empty")]
    EmptyDocument,

    /// Body is binary or carries no markup at all
    #[error("document is not markup")]
    NotMarkup,
}

/// Failure to turn one URL into a page result.
#[derive(Debug, Error)]
pub enum PageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("extraction failed for {url}: {source}")]
    Extraction {
        url: String,
        #[source]
        source: ExtractionError,
    },
}

/// Errors from the optional AI summary collaborator.
///
/// These never reach callers of the monitoring cycle; they only select the
/// deterministic fallback summary.
#[derive(Debug, Error)]
pub enum SummaryError {
    /// Service did not answer its health probe
    #[error("summary service unavailable: {0}")]
    Unavailable(String),

    /// Request to the service failed
    #[error("summary request failed: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Service answered with something we cannot use
    #[error("invalid summary response: {0}")]
    InvalidResponse(String),
}

/// Errors from the storage collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Stored value could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Row referenced by id does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
}

/// Errors from checking a single source or sublink.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Page(#[from] PageError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Deep crawl could not extract the start page
    #[error("crawl failed for {url}: {reason}")]
    Crawl { url: String, reason: String },
}

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
