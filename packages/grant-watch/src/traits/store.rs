//! Storage collaborator for sources, sublinks and change records.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::types::{
    ChangeRecord, CheckUpdate, MonitoredSource, SourceStatus, Sublink, SublinkStatus,
    SublinkUpsert,
};

/// Durable state read and written by the monitoring cycle.
///
/// Each row is updated independently; no cross-source locking is needed.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// List sources, optionally only enabled ones, oldest first.
    async fn list_sources(&self, enabled_only: bool) -> StoreResult<Vec<MonitoredSource>>;

    /// Get a source by id.
    async fn get_source(&self, id: Uuid) -> StoreResult<Option<MonitoredSource>>;

    /// Register a new source.
    async fn add_source(&self, source: &MonitoredSource) -> StoreResult<()>;

    /// Write back the outcome of a check.
    ///
    /// A snapshot in `update` replaces the stored snapshot and hash; `None`
    /// keeps them.
    async fn record_source_check(
        &self,
        id: Uuid,
        status: SourceStatus,
        update: &CheckUpdate,
    ) -> StoreResult<()>;

    /// Append a change record.
    async fn append_change(&self, record: &ChangeRecord) -> StoreResult<()>;

    /// Change records for a source (including its sublinks), newest first.
    async fn list_changes(&self, source_id: Uuid) -> StoreResult<Vec<ChangeRecord>>;

    /// Insert a sublink unless `(parent, url)` is already known.
    ///
    /// Known rows get `last_seen_at` refreshed and are returned as
    /// [`SublinkUpsert::Existing`].
    async fn upsert_sublink(
        &self,
        parent_source_id: Uuid,
        url: &str,
        link_text: &str,
        depth: u32,
    ) -> StoreResult<SublinkUpsert>;

    /// Sublinks of enabled sources due for a check: never-checked first,
    /// then oldest check.
    ///
    /// At most `max_total` overall and `max_per_source` per parent.
    async fn sublinks_due(
        &self,
        max_total: usize,
        max_per_source: usize,
    ) -> StoreResult<Vec<Sublink>>;

    /// Write back the outcome of a sublink check and bump its crawl count.
    async fn record_sublink_check(
        &self,
        id: Uuid,
        status: SublinkStatus,
        update: &CheckUpdate,
    ) -> StoreResult<()>;

    /// Sublinks registered under a source.
    async fn list_sublinks(&self, parent_source_id: Uuid) -> StoreResult<Vec<Sublink>>;
}
