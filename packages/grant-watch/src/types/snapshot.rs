//! Page snapshots - the noise-reduced form of one fetch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// A relevant anchor found on a page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageLink {
    /// Raw href as written in the markup
    pub href: String,

    /// Anchor text with inner tags removed
    pub text: String,
}

impl PageLink {
    pub fn new(href: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            text: text.into(),
        }
    }
}

/// Semantic representation of a page, used for all comparisons.
///
/// Snapshots are produced fresh on every fetch and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    /// Contents of `<title>`
    pub title: String,

    /// `<h1>`-`<h3>` texts in document order, deduplicated
    pub headings: Vec<String>,

    /// Relevant anchors in document order, deduplicated by href
    pub links: Vec<PageLink>,

    /// Date tokens found near a context keyword
    pub dates: BTreeSet<String>,

    /// Cleaned multi-line body text
    pub normalized_text: String,

    /// SHA-256 (hex) of the untouched markup
    pub raw_hash: String,
}

impl PageSnapshot {
    /// Calculate SHA-256 hash of raw content.
    pub fn hash_content(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Check whether `raw` hashes to the same digest as this snapshot.
    pub fn same_content(&self, raw: &str) -> bool {
        Self::hash_content(raw) == self.raw_hash
    }

    /// First heading, if any.
    pub fn first_heading(&self) -> Option<&str> {
        self.headings.first().map(String::as_str)
    }
}

/// A link discovered on a fetched page that passed the relevance filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredLink {
    /// Absolute URL, resolved against the page it was found on
    pub url: String,

    /// Anchor text
    pub text: String,

    /// Depth the link would be crawled at
    pub depth: usize,
}

/// One successfully fetched and extracted page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// URL that was requested
    pub url: String,

    /// Link depth from the crawl start (0 for the start page)
    pub depth: usize,

    /// Extracted snapshot
    pub snapshot: PageSnapshot,

    /// Relevant outbound links found on this page
    #[serde(default)]
    pub links: Vec<DiscoveredLink>,

    /// When the page was fetched
    pub fetched_at: DateTime<Utc>,
}

impl PageResult {
    /// Short label for this page: its first heading, else its title.
    pub fn label(&self) -> Option<&str> {
        self.snapshot
            .first_heading()
            .or_else(|| Some(self.snapshot.title.as_str()).filter(|t| !t.is_empty()))
    }
}
