//! Storage implementations.
//!
//! Available backends:
//! - `MemoryStore` - In-memory storage for tests and dry runs
//! - `SqliteStore` - SQLite file-based storage

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::types::Sublink;
use std::collections::HashMap;
use uuid::Uuid;

/// Order candidates for a sublink run and apply the per-parent and total caps.
///
/// Never-checked sublinks come first (oldest registration first), then the
/// ones checked longest ago.
pub(crate) fn select_due(
    mut candidates: Vec<Sublink>,
    max_total: usize,
    max_per_source: usize,
) -> Vec<Sublink> {
    candidates.sort_by(|a, b| match (a.last_checked_at, b.last_checked_at) {
        (None, None) => a.created_at.cmp(&b.created_at),
        (None, Some(_)) => std::cmp::Ordering::Less,
        (Some(_), None) => std::cmp::Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(&y),
    });

    let mut per_parent: HashMap<Uuid, usize> = HashMap::new();
    let mut due = Vec::new();
    for sublink in candidates {
        if due.len() >= max_total {
            break;
        }
        let count = per_parent.entry(sublink.parent_source_id).or_default();
        if *count >= max_per_source {
            continue;
        }
        *count += 1;
        due.push(sublink);
    }
    due
}
