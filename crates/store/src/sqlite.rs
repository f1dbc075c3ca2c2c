//! SQLite-backed metadata catalog.
//!
//! Holds the durable dedup records. As a resource store its items are artifact
//! ids: deleting one removes every record that points at it. Records have no
//! TTL of their own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;
use std::time::Duration;

use lifecycle_core::{
    traits::{DedupCatalog, ResourceStoreAdapter},
    types::{ContentHash, DedupRecord, RegisterOutcome, ResourceKind},
    Error, Result,
};

const KIND: ResourceKind = ResourceKind::MetadataCatalog;

/// SQLite catalog of content-addressed metadata.
pub struct SqliteCatalog {
    conn: Arc<tokio::sync::Mutex<Connection>>,
}

impl SqliteCatalog {
    /// Open (or create) the catalog at the given path.
    pub fn new(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| Error::unavailable(KIND.as_str(), format!("DB error: {}", e)))?;
        Self::with_connection(conn)
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::unavailable(KIND.as_str(), format!("DB error: {}", e)))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS dedup_records (
                owner_id TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                artifact_id TEXT NOT NULL,
                created_at INTEGER NOT NULL, -- unix millis
                PRIMARY KEY (owner_id, content_hash)
            )",
            [],
        )
        .map_err(|e| Error::storage(format!("Schema error: {}", e)))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_dedup_artifact ON dedup_records (artifact_id)",
            [],
        )
        .map_err(|e| Error::storage(format!("Index error: {}", e)))?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_dedup_created ON dedup_records (created_at)",
            [],
        )
        .map_err(|e| Error::storage(format!("Index error: {}", e)))?;

        Ok(Self {
            conn: Arc::new(tokio::sync::Mutex::new(conn)),
        })
    }

    /// Run `op` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            op(&mut conn)
        })
        .await
        .map_err(|e| Error::internal(e.to_string()))?
    }

    fn query_error(e: rusqlite::Error) -> Error {
        Error::storage(format!("Query error: {}", e))
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String, i64)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    }

    fn into_record(raw: (String, String, String, i64)) -> Result<DedupRecord> {
        let (owner_id, content_hash, artifact_id, created_at) = raw;
        Ok(DedupRecord {
            content_hash: ContentHash::parse(&content_hash)?,
            owner_id,
            artifact_id,
            created_at: DateTime::<Utc>::from_timestamp_millis(created_at).unwrap_or_default(),
        })
    }

    fn age_of(created_at_millis: i64) -> Duration {
        let age = Utc::now().timestamp_millis() - created_at_millis;
        Duration::from_millis(age.max(0) as u64)
    }
}

#[async_trait]
impl DedupCatalog for SqliteCatalog {
    async fn lookup(&self, owner_id: &str, hash: &ContentHash) -> Result<Option<DedupRecord>> {
        let owner_id = owner_id.to_string();
        let hash = hash.as_str().to_string();

        let raw = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT owner_id, content_hash, artifact_id, created_at
                     FROM dedup_records WHERE owner_id = ?1 AND content_hash = ?2",
                    params![owner_id, hash],
                    Self::row_to_record,
                )
                .optional()
                .map_err(Self::query_error)
            })
            .await?;

        raw.map(Self::into_record).transpose()
    }

    async fn insert_if_absent(&self, record: DedupRecord) -> Result<RegisterOutcome> {
        let candidate = record.clone();

        let (inserted, raw) = self
            .with_conn(move |conn| {
                let tx = conn.transaction().map_err(Self::query_error)?;
                let changed = tx
                    .execute(
                        "INSERT INTO dedup_records (owner_id, content_hash, artifact_id, created_at)
                         VALUES (?1, ?2, ?3, ?4)
                         ON CONFLICT (owner_id, content_hash) DO NOTHING",
                        params![
                            candidate.owner_id,
                            candidate.content_hash.as_str(),
                            candidate.artifact_id,
                            candidate.created_at.timestamp_millis()
                        ],
                    )
                    .map_err(Self::query_error)?;

                let winner = tx
                    .query_row(
                        "SELECT owner_id, content_hash, artifact_id, created_at
                         FROM dedup_records WHERE owner_id = ?1 AND content_hash = ?2",
                        params![candidate.owner_id, candidate.content_hash.as_str()],
                        Self::row_to_record,
                    )
                    .map_err(Self::query_error)?;
                tx.commit().map_err(Self::query_error)?;

                Ok((changed == 1, winner))
            })
            .await?;

        if inserted {
            Ok(RegisterOutcome::Inserted(record))
        } else {
            Ok(RegisterOutcome::Existing(Self::into_record(raw)?))
        }
    }

    async fn remove_artifact(&self, artifact_id: &str) -> Result<usize> {
        let artifact_id = artifact_id.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM dedup_records WHERE artifact_id = ?1", params![artifact_id])
                .map_err(Self::query_error)
        })
        .await
    }
}

#[async_trait]
impl ResourceStoreAdapter for SqliteCatalog {
    fn kind(&self) -> ResourceKind {
        KIND
    }

    async fn count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(DISTINCT artifact_id) FROM dedup_records", [], |row| row.get(0))
                .map_err(Self::query_error)?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    async fn size_bytes(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let size: i64 = conn
                .query_row(
                    "SELECT COALESCE(SUM(LENGTH(owner_id) + LENGTH(content_hash) + LENGTH(artifact_id) + 8), 0)
                     FROM dedup_records",
                    [],
                    |row| row.get(0),
                )
                .map_err(Self::query_error)?;
            Ok(size.max(0) as u64)
        })
        .await
    }

    async fn oldest_item_age(&self) -> Result<Option<Duration>> {
        let oldest: Option<i64> = self
            .with_conn(|conn| {
                conn.query_row("SELECT MIN(created_at) FROM dedup_records", [], |row| row.get(0))
                    .map_err(Self::query_error)
            })
            .await?;

        Ok(oldest.map(Self::age_of))
    }

    /// Records never expire by age; they go when their artifact is deleted.
    async fn list_older_than(&self, _age: Duration) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let removed = self.remove_artifact(id).await?;
        tracing::trace!(artifact_id = %id, removed, "Removed catalog records");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_aged(owner: &str, content: &[u8], artifact: &str, age: Duration) -> DedupRecord {
        let mut record = DedupRecord::new(owner, ContentHash::of(content), artifact);
        record.created_at = Utc::now() - chrono::Duration::from_std(age).unwrap();
        record
    }

    #[tokio::test]
    async fn test_insert_if_absent_returns_winner() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let hash = ContentHash::of(b"quarterly.pdf");

        let first = catalog
            .insert_if_absent(DedupRecord::new("u1", hash.clone(), "a1"))
            .await
            .unwrap();
        assert!(first.is_inserted());

        let loser = catalog
            .insert_if_absent(DedupRecord::new("u1", hash.clone(), "a2"))
            .await
            .unwrap();
        assert!(!loser.is_inserted());
        assert_eq!(loser.artifact_id(), "a1");

        let found = catalog.lookup("u1", &hash).await.unwrap().unwrap();
        assert_eq!(found.artifact_id, "a1");
        assert!(catalog.lookup("u2", &hash).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_catalog_survives_reopen() {
        use tempfile::NamedTempFile;
        let temp_file = NamedTempFile::new().unwrap();
        let hash = ContentHash::of(b"persisted");

        {
            let catalog = SqliteCatalog::new(temp_file.path()).unwrap();
            catalog
                .insert_if_absent(DedupRecord::new("u1", hash.clone(), "a1"))
                .await
                .unwrap();
        }

        let reopened = SqliteCatalog::new(temp_file.path()).unwrap();
        let found = reopened.lookup("u1", &hash).await.unwrap().unwrap();
        assert_eq!(found.artifact_id, "a1");
    }

    #[tokio::test]
    async fn test_store_view_counts_artifacts() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        assert_eq!(catalog.count().await.unwrap(), 0);
        assert!(catalog.oldest_item_age().await.unwrap().is_none());

        catalog
            .insert_if_absent(record_aged("u1", b"a", "a1", Duration::from_secs(10 * 86400)))
            .await
            .unwrap();
        catalog
            .insert_if_absent(record_aged("u1", b"b", "a2", Duration::from_secs(60)))
            .await
            .unwrap();

        assert_eq!(catalog.count().await.unwrap(), 2);
        assert!(catalog.size_bytes().await.unwrap() > 0);

        let oldest = catalog.oldest_item_age().await.unwrap().unwrap();
        assert!(oldest >= Duration::from_secs(10 * 86400 - 5));

        // A 10-day-old record is not a candidate for TTL deletion.
        assert!(catalog.list_older_than(Duration::from_secs(86400)).await.unwrap().is_empty());
        assert!(catalog.list_older_than(Duration::from_secs(u64::MAX / 1000)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_cascades_and_is_idempotent() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let hash = ContentHash::of(b"doc");
        catalog
            .insert_if_absent(DedupRecord::new("u1", hash.clone(), "a1"))
            .await
            .unwrap();

        ResourceStoreAdapter::delete(&catalog, "a1").await.unwrap();
        ResourceStoreAdapter::delete(&catalog, "a1").await.unwrap();

        assert!(catalog.lookup("u1", &hash).await.unwrap().is_none());
        assert_eq!(catalog.count().await.unwrap(), 0);
    }
}
