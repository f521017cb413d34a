//! Optional AI summary collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SummaryError;
use crate::types::{ChangeEvent, Priority};

/// Summary of one source's change events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeAnalysis {
    pub summary: String,
    pub priority: Priority,
    pub keywords: Vec<String>,

    /// False when this is the deterministic fallback
    pub ai_generated: bool,
}

/// Summarizes change events for a reviewer.
///
/// Errors are never surfaced past the monitoring cycle; callers go through
/// [`crate::summarizer::analyze_changes`], which falls back to
/// [`crate::summarizer::basic_summary`].
#[async_trait]
pub trait ChangeSummarizer: Send + Sync {
    /// Whether the service is reachable right now.
    async fn is_available(&self) -> bool {
        true
    }

    async fn summarize(
        &self,
        events: &[ChangeEvent],
        source_name: &str,
    ) -> Result<ChangeAnalysis, SummaryError>;

    /// Summarizer name (for logging).
    fn name(&self) -> &str {
        "unknown"
    }
}
