//! Monitored sources, sublinks and stored change records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::change::{ChangeEvent, ChangeKind, Priority};
use super::snapshot::PageSnapshot;

/// Kind of organisation a source belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Private foundation grant pages
    Foundation,
    /// Government bodies and official bulletins
    PublicBody,
    /// Aggregator portals and anything else
    Other,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::Foundation, SourceKind::PublicBody, SourceKind::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Foundation => "foundation",
            SourceKind::PublicBody => "public_body",
            SourceKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "foundation" => Some(SourceKind::Foundation),
            "public_body" => Some(SourceKind::PublicBody),
            "other" => Some(SourceKind::Other),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the most recent check of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Pending,
    Unchanged,
    Updated,
    Error,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Pending => "pending",
            SourceStatus::Unchanged => "unchanged",
            SourceStatus::Updated => "updated",
            SourceStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SourceStatus::Pending),
            "unchanged" => Some(SourceStatus::Unchanged),
            "updated" => Some(SourceStatus::Updated),
            "error" => Some(SourceStatus::Error),
            _ => None,
        }
    }
}

/// A URL registered for monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredSource {
    pub id: Uuid,
    pub kind: SourceKind,
    pub name: String,
    pub url: String,
    pub enabled: bool,

    /// Snapshot stored by the previous successful check
    pub previous_snapshot: Option<PageSnapshot>,

    /// Digest stored by the previous successful check
    pub previous_hash: Option<String>,

    pub status: SourceStatus,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MonitoredSource {
    /// Create a pending, enabled source.
    pub fn new(kind: SourceKind, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            name: name.into(),
            url: url.into(),
            enabled: true,
            previous_snapshot: None,
            previous_hash: None,
            status: SourceStatus::Pending,
            last_checked_at: None,
            created_at: Utc::now(),
        }
    }

    /// Disable the source.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Seed stored state (used when importing existing history).
    pub fn with_previous_snapshot(mut self, snapshot: PageSnapshot) -> Self {
        self.previous_hash = Some(snapshot.raw_hash.clone());
        self.previous_snapshot = Some(snapshot);
        self
    }

    /// Seed only a stored digest.
    pub fn with_previous_hash(mut self, hash: impl Into<String>) -> Self {
        self.previous_hash = Some(hash.into());
        self
    }
}

/// Lifecycle of a discovered sublink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SublinkStatus {
    Pending,
    Active,
    Error,
}

impl SublinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SublinkStatus::Pending => "pending",
            SublinkStatus::Active => "active",
            SublinkStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SublinkStatus::Pending),
            "active" => Some(SublinkStatus::Active),
            "error" => Some(SublinkStatus::Error),
            _ => None,
        }
    }
}

/// A page discovered from a source, itself eligible for monitoring.
///
/// Unique per `(parent_source_id, url)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sublink {
    pub id: Uuid,
    pub parent_source_id: Uuid,
    pub url: String,
    pub link_text: String,
    pub depth: u32,
    pub status: SublinkStatus,
    pub previous_snapshot: Option<PageSnapshot>,
    pub previous_hash: Option<String>,
    pub last_error: Option<String>,
    pub crawl_count: u32,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Sublink {
    pub fn new(
        parent_source_id: Uuid,
        url: impl Into<String>,
        link_text: impl Into<String>,
        depth: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            parent_source_id,
            url: url.into(),
            link_text: link_text.into(),
            depth,
            status: SublinkStatus::Pending,
            previous_snapshot: None,
            previous_hash: None,
            last_error: None,
            crawl_count: 0,
            last_checked_at: None,
            last_seen_at: now,
            created_at: now,
        }
    }
}

/// Whether a sublink upsert created a new row.
#[derive(Debug, Clone)]
pub enum SublinkUpsert {
    Created(Sublink),
    Existing(Sublink),
}

impl SublinkUpsert {
    pub fn is_created(&self) -> bool {
        matches!(self, SublinkUpsert::Created(_))
    }

    pub fn sublink(&self) -> &Sublink {
        match self {
            SublinkUpsert::Created(s) | SublinkUpsert::Existing(s) => s,
        }
    }
}

/// State written back after checking a source or sublink.
#[derive(Debug, Clone)]
pub struct CheckUpdate {
    /// New snapshot; `None` keeps the stored one
    pub snapshot: Option<PageSnapshot>,
    pub checked_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl CheckUpdate {
    pub fn success(snapshot: PageSnapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
            checked_at: Utc::now(),
            error: None,
        }
    }

    /// Touch `last_checked_at` without replacing stored content.
    pub fn keep_previous() -> Self {
        Self {
            snapshot: None,
            checked_at: Utc::now(),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            snapshot: None,
            checked_at: Utc::now(),
            error: Some(error.into()),
        }
    }
}

/// Review state of a stored change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Relevant,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Relevant => "relevant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReviewStatus::Pending),
            "relevant" => Some(ReviewStatus::Relevant),
            _ => None,
        }
    }
}

/// A change event as appended to storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: Uuid,
    pub source_id: Uuid,
    pub sublink_id: Option<Uuid>,
    pub url: String,
    pub change_type: ChangeKind,
    pub old_hash: Option<String>,
    pub new_hash: String,
    pub source_kind: SourceKind,
    pub source_name: String,
    pub description: String,
    pub priority: Priority,
    pub review_status: ReviewStatus,
    pub event: ChangeEvent,
    pub created_at: DateTime<Utc>,
}
