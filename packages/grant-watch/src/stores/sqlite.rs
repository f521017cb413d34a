//! SQLite storage implementation.
//!
//! A file-based storage backend using SQLite. Snapshots and change events
//! are stored as JSON text; timestamps as fixed-width RFC 3339 text so they
//! sort correctly.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::traits::store::SourceStore;
use crate::types::{
    ChangeEvent, ChangeKind, ChangeRecord, CheckUpdate, MonitoredSource, PageSnapshot, Priority,
    ReviewStatus, SourceKind, SourceStatus, Sublink, SublinkStatus, SublinkUpsert,
};

use super::select_due;

/// SQLite-based source store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store with the given connection URL.
    ///
    /// # Example URLs
    /// - `sqlite::memory:` - In-memory database (ephemeral)
    /// - `sqlite://grant-watch.db?mode=rwc` - Create if not exists
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        Self::connect(database_url, 5).await
    }

    /// Create an in-memory SQLite store (for testing).
    ///
    /// Uses a single connection, since every connection to `:memory:` opens
    /// its own empty database.
    pub async fn in_memory() -> StoreResult<Self> {
        Self::connect("sqlite::memory:", 1).await
    }

    async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(db)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                name TEXT NOT NULL,
                url TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                previous_snapshot TEXT,
                previous_hash TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                last_checked_at TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sources_enabled ON sources(enabled);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sublinks (
                id TEXT PRIMARY KEY,
                parent_source_id TEXT NOT NULL REFERENCES sources(id),
                url TEXT NOT NULL,
                link_text TEXT NOT NULL,
                depth INTEGER NOT NULL DEFAULT 1,
                status TEXT NOT NULL DEFAULT 'pending',
                previous_snapshot TEXT,
                previous_hash TEXT,
                last_error TEXT,
                crawl_count INTEGER NOT NULL DEFAULT 0,
                last_checked_at TEXT,
                last_seen_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(parent_source_id, url)
            );

            CREATE INDEX IF NOT EXISTS idx_sublinks_parent ON sublinks(parent_source_id);
            CREATE INDEX IF NOT EXISTS idx_sublinks_status ON sublinks(status);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS change_records (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                sublink_id TEXT,
                url TEXT NOT NULL,
                change_type TEXT NOT NULL,
                old_hash TEXT,
                new_hash TEXT NOT NULL,
                source_kind TEXT NOT NULL,
                source_name TEXT NOT NULL,
                description TEXT NOT NULL,
                priority TEXT NOT NULL,
                review_status TEXT NOT NULL,
                event TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_changes_source ON change_records(source_id);
            CREATE INDEX IF NOT EXISTS idx_changes_created ON change_records(created_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db)?;

        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_sublink(&self, parent_source_id: Uuid, url: &str) -> StoreResult<Sublink> {
        let row: SublinkRow = sqlx::query_as(
            "SELECT * FROM sublinks WHERE parent_source_id = ? AND url = ?",
        )
        .bind(parent_source_id.to_string())
        .bind(url)
        .fetch_one(&self.pool)
        .await
        .map_err(db)?;
        row.into_sublink()
    }
}

fn db(e: sqlx::Error) -> StoreError {
    StoreError::Database(Box::new(e))
}

fn invalid(what: &str, value: &str) -> StoreError {
    StoreError::Database(format!("Invalid {}: {}", what, value).into())
}

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| invalid("date", value))
}

fn parse_opt_ts(value: Option<String>) -> StoreResult<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_ts).transpose()
}

fn parse_id(value: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| invalid("id", value))
}

fn parse_snapshot(value: Option<String>) -> StoreResult<Option<PageSnapshot>> {
    value
        .as_deref()
        .map(serde_json::from_str::<PageSnapshot>)
        .transpose()
        .map_err(StoreError::from)
}

fn snapshot_json(update: &CheckUpdate) -> StoreResult<Option<String>> {
    update
        .snapshot
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(StoreError::from)
}

// Row types for sqlx queries
#[derive(Debug, FromRow)]
struct SourceRow {
    id: String,
    kind: String,
    name: String,
    url: String,
    enabled: bool,
    previous_snapshot: Option<String>,
    previous_hash: Option<String>,
    status: String,
    last_checked_at: Option<String>,
    created_at: String,
}

impl SourceRow {
    fn into_source(self) -> StoreResult<MonitoredSource> {
        Ok(MonitoredSource {
            id: parse_id(&self.id)?,
            kind: SourceKind::parse(&self.kind).ok_or_else(|| invalid("source kind", &self.kind))?,
            name: self.name,
            url: self.url,
            enabled: self.enabled,
            previous_snapshot: parse_snapshot(self.previous_snapshot)?,
            previous_hash: self.previous_hash,
            status: SourceStatus::parse(&self.status)
                .ok_or_else(|| invalid("source status", &self.status))?,
            last_checked_at: parse_opt_ts(self.last_checked_at)?,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct SublinkRow {
    id: String,
    parent_source_id: String,
    url: String,
    link_text: String,
    depth: i64,
    status: String,
    previous_snapshot: Option<String>,
    previous_hash: Option<String>,
    last_error: Option<String>,
    crawl_count: i64,
    last_checked_at: Option<String>,
    last_seen_at: String,
    created_at: String,
}

impl SublinkRow {
    fn into_sublink(self) -> StoreResult<Sublink> {
        Ok(Sublink {
            id: parse_id(&self.id)?,
            parent_source_id: parse_id(&self.parent_source_id)?,
            url: self.url,
            link_text: self.link_text,
            depth: u32::try_from(self.depth).map_err(|_| invalid("depth", &self.depth.to_string()))?,
            status: SublinkStatus::parse(&self.status)
                .ok_or_else(|| invalid("sublink status", &self.status))?,
            previous_snapshot: parse_snapshot(self.previous_snapshot)?,
            previous_hash: self.previous_hash,
            last_error: self.last_error,
            crawl_count: u32::try_from(self.crawl_count)
                .map_err(|_| invalid("crawl count", &self.crawl_count.to_string()))?,
            last_checked_at: parse_opt_ts(self.last_checked_at)?,
            last_seen_at: parse_ts(&self.last_seen_at)?,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct ChangeRow {
    id: String,
    source_id: String,
    sublink_id: Option<String>,
    url: String,
    change_type: String,
    old_hash: Option<String>,
    new_hash: String,
    source_kind: String,
    source_name: String,
    description: String,
    priority: String,
    review_status: String,
    event: String,
    created_at: String,
}

impl ChangeRow {
    fn into_record(self) -> StoreResult<ChangeRecord> {
        let event: ChangeEvent = serde_json::from_str(&self.event)?;
        Ok(ChangeRecord {
            id: parse_id(&self.id)?,
            source_id: parse_id(&self.source_id)?,
            sublink_id: self.sublink_id.as_deref().map(parse_id).transpose()?,
            url: self.url,
            change_type: ChangeKind::parse(&self.change_type)
                .ok_or_else(|| invalid("change type", &self.change_type))?,
            old_hash: self.old_hash,
            new_hash: self.new_hash,
            source_kind: SourceKind::parse(&self.source_kind)
                .ok_or_else(|| invalid("source kind", &self.source_kind))?,
            source_name: self.source_name,
            description: self.description,
            priority: Priority::parse(&self.priority)
                .ok_or_else(|| invalid("priority", &self.priority))?,
            review_status: ReviewStatus::parse(&self.review_status)
                .ok_or_else(|| invalid("review status", &self.review_status))?,
            event,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

#[async_trait]
impl SourceStore for SqliteStore {
    async fn list_sources(&self, enabled_only: bool) -> StoreResult<Vec<MonitoredSource>> {
        let query = if enabled_only {
            "SELECT * FROM sources WHERE enabled = 1 ORDER BY created_at, rowid"
        } else {
            "SELECT * FROM sources ORDER BY created_at, rowid"
        };
        let rows: Vec<SourceRow> = sqlx::query_as(query)
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;

        rows.into_iter().map(SourceRow::into_source).collect()
    }

    async fn get_source(&self, id: Uuid) -> StoreResult<Option<MonitoredSource>> {
        let row: Option<SourceRow> = sqlx::query_as("SELECT * FROM sources WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

        row.map(SourceRow::into_source).transpose()
    }

    async fn add_source(&self, source: &MonitoredSource) -> StoreResult<()> {
        let snapshot = source
            .previous_snapshot
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO sources (id, kind, name, url, enabled, previous_snapshot, previous_hash,
                                 status, last_checked_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                name = excluded.name,
                url = excluded.url,
                enabled = excluded.enabled,
                previous_snapshot = excluded.previous_snapshot,
                previous_hash = excluded.previous_hash,
                status = excluded.status,
                last_checked_at = excluded.last_checked_at
            "#,
        )
        .bind(source.id.to_string())
        .bind(source.kind.as_str())
        .bind(&source.name)
        .bind(&source.url)
        .bind(source.enabled)
        .bind(snapshot)
        .bind(source.previous_hash.clone())
        .bind(source.status.as_str())
        .bind(source.last_checked_at.map(ts))
        .bind(ts(source.created_at))
        .execute(&self.pool)
        .await
        .map_err(db)?;

        Ok(())
    }

    async fn record_source_check(
        &self,
        id: Uuid,
        status: SourceStatus,
        update: &CheckUpdate,
    ) -> StoreResult<()> {
        let snapshot = snapshot_json(update)?;
        let hash = update.snapshot.as_ref().map(|s| s.raw_hash.clone());

        let result = sqlx::query(
            r#"
            UPDATE sources SET
                previous_snapshot = COALESCE(?, previous_snapshot),
                previous_hash = COALESCE(?, previous_hash),
                status = ?,
                last_checked_at = ?
            WHERE id = ?
            "#,
        )
        .bind(snapshot)
        .bind(hash)
        .bind(status.as_str())
        .bind(ts(update.checked_at))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "source",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn append_change(&self, record: &ChangeRecord) -> StoreResult<()> {
        let event = serde_json::to_string(&record.event)?;

        sqlx::query(
            r#"
            INSERT INTO change_records (id, source_id, sublink_id, url, change_type, old_hash,
                                        new_hash, source_kind, source_name, description,
                                        priority, review_status, event, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.source_id.to_string())
        .bind(record.sublink_id.map(|id| id.to_string()))
        .bind(&record.url)
        .bind(record.change_type.as_str())
        .bind(record.old_hash.clone())
        .bind(&record.new_hash)
        .bind(record.source_kind.as_str())
        .bind(&record.source_name)
        .bind(&record.description)
        .bind(record.priority.as_str())
        .bind(record.review_status.as_str())
        .bind(event)
        .bind(ts(record.created_at))
        .execute(&self.pool)
        .await
        .map_err(db)?;

        Ok(())
    }

    async fn list_changes(&self, source_id: Uuid) -> StoreResult<Vec<ChangeRecord>> {
        let rows: Vec<ChangeRow> = sqlx::query_as(
            "SELECT * FROM change_records WHERE source_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(source_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.into_iter().map(ChangeRow::into_record).collect()
    }

    async fn upsert_sublink(
        &self,
        parent_source_id: Uuid,
        url: &str,
        link_text: &str,
        depth: u32,
    ) -> StoreResult<SublinkUpsert> {
        let sublink = Sublink::new(parent_source_id, url, link_text, depth);

        let inserted = sqlx::query(
            r#"
            INSERT INTO sublinks (id, parent_source_id, url, link_text, depth, status,
                                  crawl_count, last_seen_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)
            ON CONFLICT(parent_source_id, url) DO NOTHING
            "#,
        )
        .bind(sublink.id.to_string())
        .bind(parent_source_id.to_string())
        .bind(url)
        .bind(link_text)
        .bind(i64::from(depth))
        .bind(sublink.status.as_str())
        .bind(ts(sublink.last_seen_at))
        .bind(ts(sublink.created_at))
        .execute(&self.pool)
        .await
        .map_err(db)?;

        if inserted.rows_affected() == 1 {
            return Ok(SublinkUpsert::Created(sublink));
        }

        sqlx::query("UPDATE sublinks SET last_seen_at = ? WHERE parent_source_id = ? AND url = ?")
            .bind(ts(Utc::now()))
            .bind(parent_source_id.to_string())
            .bind(url)
            .execute(&self.pool)
            .await
            .map_err(db)?;

        Ok(SublinkUpsert::Existing(
            self.fetch_sublink(parent_source_id, url).await?,
        ))
    }

    async fn sublinks_due(
        &self,
        max_total: usize,
        max_per_source: usize,
    ) -> StoreResult<Vec<Sublink>> {
        let rows: Vec<SublinkRow> = sqlx::query_as(
            r#"
            SELECT s.* FROM sublinks s
            JOIN sources p ON p.id = s.parent_source_id
            WHERE p.enabled = 1
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let candidates = rows
            .into_iter()
            .map(SublinkRow::into_sublink)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(select_due(candidates, max_total, max_per_source))
    }

    async fn record_sublink_check(
        &self,
        id: Uuid,
        status: SublinkStatus,
        update: &CheckUpdate,
    ) -> StoreResult<()> {
        let snapshot = snapshot_json(update)?;
        let hash = update.snapshot.as_ref().map(|s| s.raw_hash.clone());

        let result = sqlx::query(
            r#"
            UPDATE sublinks SET
                previous_snapshot = COALESCE(?, previous_snapshot),
                previous_hash = COALESCE(?, previous_hash),
                status = ?,
                last_error = ?,
                crawl_count = crawl_count + 1,
                last_checked_at = ?
            WHERE id = ?
            "#,
        )
        .bind(snapshot)
        .bind(hash)
        .bind(status.as_str())
        .bind(update.error.clone())
        .bind(ts(update.checked_at))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "sublink",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn list_sublinks(&self, parent_source_id: Uuid) -> StoreResult<Vec<Sublink>> {
        let rows: Vec<SublinkRow> = sqlx::query_as(
            "SELECT * FROM sublinks WHERE parent_source_id = ? ORDER BY created_at, rowid",
        )
        .bind(parent_source_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.into_iter().map(SublinkRow::into_sublink).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Change, PageLink};
    use std::collections::BTreeSet;

    fn snapshot(raw: &str) -> PageSnapshot {
        PageSnapshot {
            title: "Becas".to_string(),
            headings: vec!["Convocatoria 2025".to_string()],
            links: vec![PageLink::new("/becas", "Becas")],
            dates: ["15/03/2025".to_string()].into_iter().collect::<BTreeSet<_>>(),
            normalized_text: "Convocatoria 2025".to_string(),
            raw_hash: PageSnapshot::hash_content(raw),
        }
    }

    #[tokio::test]
    async fn test_source_round_trip() {
        let store = SqliteStore::in_memory().await.unwrap();
        let source = MonitoredSource::new(
            SourceKind::PublicBody,
            "Ministerio",
            "https://ministerio.example.es/ayudas",
        );
        store.add_source(&source).await.unwrap();

        let snap = snapshot("<p>v1</p>");
        store
            .record_source_check(source.id, SourceStatus::Updated, &CheckUpdate::success(snap.clone()))
            .await
            .unwrap();
        store
            .record_source_check(source.id, SourceStatus::Error, &CheckUpdate::failure("timeout"))
            .await
            .unwrap();

        let stored = store.get_source(source.id).await.unwrap().unwrap();
        assert_eq!(stored.kind, SourceKind::PublicBody);
        assert_eq!(stored.status, SourceStatus::Error);
        assert_eq!(stored.previous_snapshot, Some(snap.clone()));
        assert_eq!(stored.previous_hash, Some(snap.raw_hash));
        assert!(stored.last_checked_at.is_some());

        assert!(store.get_source(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_enabled_filter() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .add_source(&MonitoredSource::new(SourceKind::Foundation, "A", "https://a.example.org"))
            .await
            .unwrap();
        store
            .add_source(
                &MonitoredSource::new(SourceKind::Other, "B", "https://b.example.org").disabled(),
            )
            .await
            .unwrap();

        assert_eq!(store.list_sources(false).await.unwrap().len(), 2);
        let enabled = store.list_sources(true).await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].name, "A");
    }

    #[tokio::test]
    async fn test_change_records_newest_first() {
        let store = SqliteStore::in_memory().await.unwrap();
        let source_id = Uuid::new_v4();

        for (i, priority) in [Priority::High, Priority::Urgent].into_iter().enumerate() {
            let event = ChangeEvent::new(
                Change::TitleChange {
                    old: "A".to_string(),
                    new: format!("B{}", i),
                },
                priority,
            );
            let record = ChangeRecord {
                id: Uuid::new_v4(),
                source_id,
                sublink_id: None,
                url: "https://a.example.org".to_string(),
                change_type: event.kind(),
                old_hash: Some("old".to_string()),
                new_hash: "new".to_string(),
                source_kind: SourceKind::Foundation,
                source_name: "A".to_string(),
                description: event.describe(),
                priority,
                review_status: ReviewStatus::Relevant,
                event,
                created_at: Utc::now() + chrono::Duration::seconds(i as i64),
            };
            store.append_change(&record).await.unwrap();
        }

        let changes = store.list_changes(source_id).await.unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].priority, Priority::Urgent);
        assert_eq!(changes[0].description, "Title updated: \"B1\"");
        assert_eq!(changes[0].change_type, ChangeKind::TitleChange);
        assert!(store.list_changes(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sublink_upsert_and_check() {
        let store = SqliteStore::in_memory().await.unwrap();
        let source = MonitoredSource::new(SourceKind::Foundation, "A", "https://a.example.org");
        store.add_source(&source).await.unwrap();

        let created = store
            .upsert_sublink(source.id, "https://a.example.org/becas", "Becas", 1)
            .await
            .unwrap();
        let again = store
            .upsert_sublink(source.id, "https://a.example.org/becas", "Becas", 1)
            .await
            .unwrap();
        assert!(created.is_created());
        assert!(!again.is_created());
        assert_eq!(created.sublink().id, again.sublink().id);

        let id = created.sublink().id;
        store
            .record_sublink_check(id, SublinkStatus::Error, &CheckUpdate::failure("HTTP 500"))
            .await
            .unwrap();

        let sublinks = store.list_sublinks(source.id).await.unwrap();
        assert_eq!(sublinks.len(), 1);
        assert_eq!(sublinks[0].status, SublinkStatus::Error);
        assert_eq!(sublinks[0].crawl_count, 1);
        assert_eq!(sublinks[0].last_error.as_deref(), Some("HTTP 500"));

        let due = store.sublinks_due(10, 10).await.unwrap();
        assert_eq!(due.len(), 1);

        let err = store
            .record_sublink_check(Uuid::new_v4(), SublinkStatus::Active, &CheckUpdate::keep_previous())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "sublink", .. }));
    }
}
