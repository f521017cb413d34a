//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::traits::store::SourceStore;
use crate::types::{
    ChangeRecord, CheckUpdate, MonitoredSource, SourceStatus, Sublink, SublinkStatus,
    SublinkUpsert,
};

use super::select_due;

/// In-memory storage for sources, sublinks and change records.
///
/// Useful for testing and dry runs. Data is lost on restart.
pub struct MemoryStore {
    sources: RwLock<Vec<MonitoredSource>>,
    sublinks: RwLock<HashMap<Uuid, Sublink>>,
    changes: RwLock<Vec<ChangeRecord>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
            sublinks: RwLock::new(HashMap::new()),
            changes: RwLock::new(Vec::new()),
        }
    }

    /// Get the number of stored change records.
    pub fn change_count(&self) -> usize {
        self.changes.read().unwrap().len()
    }

    /// Get the number of stored sublinks.
    pub fn sublink_count(&self) -> usize {
        self.sublinks.read().unwrap().len()
    }

    /// All change records in insertion order.
    pub fn all_changes(&self) -> Vec<ChangeRecord> {
        self.changes.read().unwrap().clone()
    }
}

#[async_trait]
impl SourceStore for MemoryStore {
    async fn list_sources(&self, enabled_only: bool) -> StoreResult<Vec<MonitoredSource>> {
        let sources = self.sources.read().unwrap();
        Ok(sources
            .iter()
            .filter(|s| !enabled_only || s.enabled)
            .cloned()
            .collect())
    }

    async fn get_source(&self, id: Uuid) -> StoreResult<Option<MonitoredSource>> {
        let sources = self.sources.read().unwrap();
        Ok(sources.iter().find(|s| s.id == id).cloned())
    }

    async fn add_source(&self, source: &MonitoredSource) -> StoreResult<()> {
        let mut sources = self.sources.write().unwrap();
        match sources.iter_mut().find(|s| s.id == source.id) {
            Some(existing) => *existing = source.clone(),
            None => sources.push(source.clone()),
        }
        Ok(())
    }

    async fn record_source_check(
        &self,
        id: Uuid,
        status: SourceStatus,
        update: &CheckUpdate,
    ) -> StoreResult<()> {
        let mut sources = self.sources.write().unwrap();
        let source = sources
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "source",
                id: id.to_string(),
            })?;

        if let Some(snapshot) = &update.snapshot {
            source.previous_hash = Some(snapshot.raw_hash.clone());
            source.previous_snapshot = Some(snapshot.clone());
        }
        source.status = status;
        source.last_checked_at = Some(update.checked_at);
        Ok(())
    }

    async fn append_change(&self, record: &ChangeRecord) -> StoreResult<()> {
        self.changes.write().unwrap().push(record.clone());
        Ok(())
    }

    async fn list_changes(&self, source_id: Uuid) -> StoreResult<Vec<ChangeRecord>> {
        let changes = self.changes.read().unwrap();
        Ok(changes
            .iter()
            .rev()
            .filter(|c| c.source_id == source_id)
            .cloned()
            .collect())
    }

    async fn upsert_sublink(
        &self,
        parent_source_id: Uuid,
        url: &str,
        link_text: &str,
        depth: u32,
    ) -> StoreResult<SublinkUpsert> {
        let mut sublinks = self.sublinks.write().unwrap();

        if let Some(existing) = sublinks
            .values_mut()
            .find(|s| s.parent_source_id == parent_source_id && s.url == url)
        {
            existing.last_seen_at = Utc::now();
            return Ok(SublinkUpsert::Existing(existing.clone()));
        }

        let sublink = Sublink::new(parent_source_id, url, link_text, depth);
        sublinks.insert(sublink.id, sublink.clone());
        Ok(SublinkUpsert::Created(sublink))
    }

    async fn sublinks_due(
        &self,
        max_total: usize,
        max_per_source: usize,
    ) -> StoreResult<Vec<Sublink>> {
        let enabled: Vec<Uuid> = self
            .sources
            .read()
            .unwrap()
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.id)
            .collect();

        let candidates: Vec<Sublink> = self
            .sublinks
            .read()
            .unwrap()
            .values()
            .filter(|s| enabled.contains(&s.parent_source_id))
            .cloned()
            .collect();

        Ok(select_due(candidates, max_total, max_per_source))
    }

    async fn record_sublink_check(
        &self,
        id: Uuid,
        status: SublinkStatus,
        update: &CheckUpdate,
    ) -> StoreResult<()> {
        let mut sublinks = self.sublinks.write().unwrap();
        let sublink = sublinks.get_mut(&id).ok_or_else(|| StoreError::NotFound {
            entity: "sublink",
            id: id.to_string(),
        })?;

        if let Some(snapshot) = &update.snapshot {
            sublink.previous_hash = Some(snapshot.raw_hash.clone());
            sublink.previous_snapshot = Some(snapshot.clone());
        }
        sublink.status = status;
        sublink.last_error = update.error.clone();
        sublink.crawl_count += 1;
        sublink.last_checked_at = Some(update.checked_at);
        Ok(())
    }

    async fn list_sublinks(&self, parent_source_id: Uuid) -> StoreResult<Vec<Sublink>> {
        let mut sublinks: Vec<Sublink> = self
            .sublinks
            .read()
            .unwrap()
            .values()
            .filter(|s| s.parent_source_id == parent_source_id)
            .cloned()
            .collect();
        sublinks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(sublinks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PageSnapshot, SourceKind};
    use std::collections::BTreeSet;

    fn snapshot(raw: &str) -> PageSnapshot {
        PageSnapshot {
            title: "T".to_string(),
            headings: vec![],
            links: vec![],
            dates: BTreeSet::new(),
            normalized_text: raw.to_string(),
            raw_hash: PageSnapshot::hash_content(raw),
        }
    }

    #[tokio::test]
    async fn test_sources_and_checks() {
        let store = MemoryStore::new();
        let enabled = MonitoredSource::new(SourceKind::Foundation, "A", "https://a.example.org");
        let disabled =
            MonitoredSource::new(SourceKind::PublicBody, "B", "https://b.example.org").disabled();
        store.add_source(&enabled).await.unwrap();
        store.add_source(&disabled).await.unwrap();

        assert_eq!(store.list_sources(false).await.unwrap().len(), 2);
        assert_eq!(store.list_sources(true).await.unwrap().len(), 1);

        let snap = snapshot("<p>v1</p>");
        store
            .record_source_check(enabled.id, SourceStatus::Unchanged, &CheckUpdate::success(snap.clone()))
            .await
            .unwrap();

        let stored = store.get_source(enabled.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SourceStatus::Unchanged);
        assert_eq!(stored.previous_hash, Some(snap.raw_hash.clone()));
        assert!(stored.last_checked_at.is_some());

        // Failure keeps the stored snapshot
        store
            .record_source_check(enabled.id, SourceStatus::Error, &CheckUpdate::failure("boom"))
            .await
            .unwrap();
        let stored = store.get_source(enabled.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SourceStatus::Error);
        assert_eq!(stored.previous_snapshot, Some(snap));
    }

    #[tokio::test]
    async fn test_missing_source_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .record_source_check(Uuid::new_v4(), SourceStatus::Updated, &CheckUpdate::keep_previous())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "source", .. }));
    }

    #[tokio::test]
    async fn test_sublink_upsert_is_deduplicated() {
        let store = MemoryStore::new();
        let parent = Uuid::new_v4();

        let first = store
            .upsert_sublink(parent, "https://a.example.org/becas", "Becas", 1)
            .await
            .unwrap();
        let second = store
            .upsert_sublink(parent, "https://a.example.org/becas", "Becas", 1)
            .await
            .unwrap();
        let other_parent = store
            .upsert_sublink(Uuid::new_v4(), "https://a.example.org/becas", "Becas", 1)
            .await
            .unwrap();

        assert!(first.is_created());
        assert!(!second.is_created());
        assert_eq!(first.sublink().id, second.sublink().id);
        assert!(other_parent.is_created());
        assert_eq!(store.sublink_count(), 2);
    }

    #[tokio::test]
    async fn test_sublinks_due_ordering_and_caps() {
        let store = MemoryStore::new();
        let a = MonitoredSource::new(SourceKind::Foundation, "A", "https://a.example.org");
        let off = MonitoredSource::new(SourceKind::Other, "Off", "https://off.example.org").disabled();
        store.add_source(&a).await.unwrap();
        store.add_source(&off).await.unwrap();

        let mut ids = Vec::new();
        for i in 0..4 {
            let up = store
                .upsert_sublink(a.id, &format!("https://a.example.org/becas/{}", i), "Beca", 1)
                .await
                .unwrap();
            ids.push(up.sublink().id);
        }
        store
            .upsert_sublink(off.id, "https://off.example.org/becas", "Beca", 1)
            .await
            .unwrap();

        // Check the first one so it moves to the back
        store
            .record_sublink_check(ids[0], SublinkStatus::Active, &CheckUpdate::keep_previous())
            .await
            .unwrap();

        let due = store.sublinks_due(10, 10).await.unwrap();
        assert_eq!(due.len(), 4);
        assert_eq!(due.last().unwrap().id, ids[0]);
        assert_eq!(due.last().unwrap().crawl_count, 1);

        let capped = store.sublinks_due(10, 2).await.unwrap();
        assert_eq!(capped.len(), 2);
        assert!(capped.iter().all(|s| s.id != ids[0]));

        assert_eq!(store.sublinks_due(1, 10).await.unwrap().len(), 1);
    }
}
