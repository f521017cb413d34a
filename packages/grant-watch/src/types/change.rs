//! Change events produced by the detector.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::snapshot::PageLink;

/// Urgency of a change, ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Priority::Low),
            "normal" => Some(Priority::Normal),
            "high" => Some(Priority::High),
            "urgent" => Some(Priority::Urgent),
            _ => None,
        }
    }

    /// Worst-case priority of a set of priorities; `Low` when empty.
    pub fn aggregate(priorities: impl IntoIterator<Item = Priority>) -> Priority {
        priorities.into_iter().max().unwrap_or(Priority::Low)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminant of a [`Change`], used as the stored change type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    TitleChange,
    HeadingsAdded,
    HeadingsRemoved,
    LinksAdded,
    LinksRemoved,
    DatesChanged,
    ContentChange,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::TitleChange => "title_change",
            ChangeKind::HeadingsAdded => "headings_added",
            ChangeKind::HeadingsRemoved => "headings_removed",
            ChangeKind::LinksAdded => "links_added",
            ChangeKind::LinksRemoved => "links_removed",
            ChangeKind::DatesChanged => "dates_changed",
            ChangeKind::ContentChange => "content_change",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "title_change" => Some(ChangeKind::TitleChange),
            "headings_added" => Some(ChangeKind::HeadingsAdded),
            "headings_removed" => Some(ChangeKind::HeadingsRemoved),
            "links_added" => Some(ChangeKind::LinksAdded),
            "links_removed" => Some(ChangeKind::LinksRemoved),
            "dates_changed" => Some(ChangeKind::DatesChanged),
            "content_change" => Some(ChangeKind::ContentChange),
            _ => None,
        }
    }

    /// Human label used by the fallback summary.
    pub fn label(&self) -> &'static str {
        match self {
            ChangeKind::TitleChange => "Title changed",
            ChangeKind::HeadingsAdded => "New headings",
            ChangeKind::HeadingsRemoved => "Headings removed",
            ChangeKind::LinksAdded => "New links",
            ChangeKind::LinksRemoved => "Links removed",
            ChangeKind::DatesChanged => "Dates/deadlines changed",
            ChangeKind::ContentChange => "Content updated",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What changed, with the type-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Change {
    TitleChange { old: String, new: String },
    HeadingsAdded { items: Vec<String> },
    HeadingsRemoved { items: Vec<String> },
    LinksAdded { items: Vec<PageLink> },
    LinksRemoved { items: Vec<PageLink> },
    DatesChanged { added: Vec<String>, removed: Vec<String> },
    ContentChange { similarity_percent: u8 },
}

impl Change {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Change::TitleChange { .. } => ChangeKind::TitleChange,
            Change::HeadingsAdded { .. } => ChangeKind::HeadingsAdded,
            Change::HeadingsRemoved { .. } => ChangeKind::HeadingsRemoved,
            Change::LinksAdded { .. } => ChangeKind::LinksAdded,
            Change::LinksRemoved { .. } => ChangeKind::LinksRemoved,
            Change::DatesChanged { .. } => ChangeKind::DatesChanged,
            Change::ContentChange { .. } => ChangeKind::ContentChange,
        }
    }
}

/// A single classified change between two snapshots of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(flatten)]
    pub change: Change,
    pub priority: Priority,
}

impl ChangeEvent {
    pub fn new(change: Change, priority: Priority) -> Self {
        Self { change, priority }
    }

    pub fn kind(&self) -> ChangeKind {
        self.change.kind()
    }

    /// One-line description of this event.
    ///
    /// Relative hrefs are left as written; see [`ChangeEvent::target_url`].
    pub fn describe(&self) -> String {
        match &self.change {
            Change::TitleChange { new, .. } => format!("Title updated: \"{}\"", new),
            Change::HeadingsAdded { items } => format!(
                "{} headings added: {}",
                items.len(),
                items.iter().take(2).cloned().collect::<Vec<_>>().join(", ")
            ),
            Change::HeadingsRemoved { items } => format!(
                "{} headings removed: {}",
                items.len(),
                items.iter().take(2).cloned().collect::<Vec<_>>().join(", ")
            ),
            Change::LinksAdded { items } => match items.first() {
                Some(first) => format!("{} new links detected: {}", items.len(), first.text),
                None => "0 new links detected".to_string(),
            },
            Change::LinksRemoved { items } => format!("{} links removed", items.len()),
            Change::DatesChanged { added, removed } => format!(
                "Dates updated. Added: {}, Removed: {}",
                added.len(),
                removed.len()
            ),
            Change::ContentChange { similarity_percent } => {
                format!("Content modified (similarity: {}%)", similarity_percent)
            }
        }
    }

    /// URL a reviewer should open for this event.
    ///
    /// For `links_added` this is the first new link resolved against
    /// `page_url`; every other event points at the page itself.
    pub fn target_url(&self, page_url: &str) -> String {
        if let Change::LinksAdded { items } = &self.change {
            if let Some(first) = items.first() {
                return url::Url::parse(page_url)
                    .and_then(|base| base.join(&first.href))
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| first.href.clone());
            }
        }
        page_url.to_string()
    }
}

/// Outcome of comparing two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub has_changes: bool,
    pub events: Vec<ChangeEvent>,
}

impl DetectionResult {
    /// Result with no changes.
    pub fn unchanged() -> Self {
        Self::default()
    }

    pub fn from_events(events: Vec<ChangeEvent>) -> Self {
        Self {
            has_changes: !events.is_empty(),
            events,
        }
    }

    /// Aggregate priority of all events.
    pub fn priority(&self) -> Priority {
        aggregate_priority(&self.events)
    }
}

/// Worst-case priority of a list of events; `Low` when the list is empty.
pub fn aggregate_priority(events: &[ChangeEvent]) -> Priority {
    Priority::aggregate(events.iter().map(|e| e.priority))
}
