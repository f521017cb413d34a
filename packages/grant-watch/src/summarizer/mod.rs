//! Change summaries for reviewers.
//!
//! [`analyze_changes`] asks the optional AI collaborator first and falls back
//! to a deterministic summary built from the event types. Summary errors
//! stop here.

pub mod ollama;

pub use ollama::OllamaSummarizer;

use tracing::{debug, warn};

use crate::traits::summarizer::{ChangeAnalysis, ChangeSummarizer};
use crate::types::{aggregate_priority, Change, ChangeEvent};

/// Deterministic summary: one label per event, comma-joined.
pub fn basic_summary(events: &[ChangeEvent]) -> String {
    let parts: Vec<String> = events
        .iter()
        .map(|event| match &event.change {
            Change::HeadingsAdded { items } => format!("{} new headings", items.len()),
            Change::LinksAdded { items } => format!("{} new links", items.len()),
            other => other.kind().label().to_string(),
        })
        .collect();

    if parts.is_empty() {
        "Changes detected".to_string()
    } else {
        parts.join(", ")
    }
}

/// Fallback analysis with the aggregate event priority.
pub fn basic_analysis(events: &[ChangeEvent]) -> ChangeAnalysis {
    ChangeAnalysis {
        summary: basic_summary(events),
        priority: aggregate_priority(events),
        keywords: Vec::new(),
        ai_generated: false,
    }
}

/// Summarize `events`, preferring the AI collaborator when one is given
/// and reachable.
pub async fn analyze_changes(
    summarizer: Option<&dyn ChangeSummarizer>,
    events: &[ChangeEvent],
    source_name: &str,
) -> ChangeAnalysis {
    let Some(summarizer) = summarizer else {
        return basic_analysis(events);
    };

    if !summarizer.is_available().await {
        debug!(summarizer = summarizer.name(), "Summarizer unavailable, using basic summary");
        return basic_analysis(events);
    }

    match summarizer.summarize(events, source_name).await {
        Ok(analysis) => analysis,
        Err(e) => {
            warn!(
                summarizer = summarizer.name(),
                source = %source_name,
                error = %e,
                "Summary failed, using basic summary"
            );
            basic_analysis(events)
        }
    }
}
