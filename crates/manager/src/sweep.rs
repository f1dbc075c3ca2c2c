//! Deletion primitives shared by the TTL loops, the queue and manual triggers.

use serde::Serialize;
use std::time::Duration;

use lifecycle_core::{traits::ResourceStoreAdapter, types::ResourceKind, Result};

use crate::bounded;
use crate::dedup::DeduplicationIndex;
use crate::instrumentation::{self, CleanupSource};

/// Result of one TTL sweep of a kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub kind: ResourceKind,
    /// Ids the store reported as expired.
    pub listed: usize,
    /// Ids actually deleted.
    pub deleted: u64,
}

/// Delete everything in `adapter` older than `ttl`.
///
/// With `cascade`, each id's dedup records are dropped before the id itself
/// is deleted, so the index never points at a deleted artifact.
///
/// Stops at the first failed call: the next tick retries, not this one.
/// Deletions made before the failure are still counted in the metrics.
pub async fn sweep_expired(
    adapter: &dyn ResourceStoreAdapter,
    ttl: Duration,
    timeout: Duration,
    source: CleanupSource,
    cascade: Option<&DeduplicationIndex>,
) -> Result<SweepReport> {
    let kind = adapter.kind();

    let expired = match bounded(timeout, "list_older_than", adapter.list_older_than(ttl)).await {
        Ok(ids) => ids,
        Err(e) => {
            instrumentation::record_failure(kind, source);
            return Err(e);
        }
    };

    let mut report = SweepReport {
        kind,
        listed: expired.len(),
        deleted: 0,
    };

    for id in &expired {
        if let Err(e) = remove(adapter, id, timeout, cascade).await {
            instrumentation::record_deleted(kind, source, report.deleted);
            instrumentation::record_failure(kind, source);
            tracing::warn!(
                kind = %kind,
                source = source.as_str(),
                id = %id,
                deleted = report.deleted,
                remaining = report.listed as u64 - report.deleted,
                error = %e,
                "Sweep stopped on failed delete"
            );
            return Err(e);
        }
        report.deleted += 1;
    }

    instrumentation::record_deleted(kind, source, report.deleted);
    tracing::info!(
        kind = %kind,
        source = source.as_str(),
        deleted = report.deleted,
        "TTL sweep finished"
    );

    Ok(report)
}

/// Delete a single id. Already-absent ids count as success.
pub async fn delete_one(
    adapter: &dyn ResourceStoreAdapter,
    id: &str,
    timeout: Duration,
    source: CleanupSource,
    cascade: Option<&DeduplicationIndex>,
) -> Result<()> {
    let kind = adapter.kind();
    match remove(adapter, id, timeout, cascade).await {
        Ok(()) => {
            instrumentation::record_deleted(kind, source, 1);
            tracing::debug!(kind = %kind, id = %id, source = source.as_str(), "Deleted resource");
            Ok(())
        }
        Err(e) => {
            instrumentation::record_failure(kind, source);
            Err(e)
        }
    }
}

async fn remove(
    adapter: &dyn ResourceStoreAdapter,
    id: &str,
    timeout: Duration,
    cascade: Option<&DeduplicationIndex>,
) -> Result<()> {
    // Records go first: a failure here leaves the artifact for the next tick.
    if let Some(dedup) = cascade {
        let forgotten = dedup.forget_artifact(id).await?;
        if forgotten > 0 {
            tracing::debug!(kind = %adapter.kind(), id = %id, forgotten, "Dropped dedup records");
        }
    }
    bounded(timeout, "delete", adapter.delete(id)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifecycle_core::{
        mocks::{FailingStore, SlowStore, UnavailableCatalog},
        types::ContentHash,
        Error,
    };
    use lifecycle_store::{InMemoryDedupCatalog, InMemoryResourceStore};
    use std::sync::Arc;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_sweep_deletes_only_expired_items() {
        let store = InMemoryResourceStore::new(ResourceKind::EphemeralCache);
        store.insert_with_age("stale-1", 10, Duration::from_secs(2 * 3600));
        store.insert_with_age("stale-2", 10, Duration::from_secs(3 * 3600));
        store.insert("fresh", 10);

        let report = sweep_expired(&store, Duration::from_secs(3600), TIMEOUT, CleanupSource::TtlSweep, None)
            .await
            .unwrap();

        assert_eq!(report.listed, 2);
        assert_eq!(report.deleted, 2);
        assert!(store.contains("fresh"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_of_empty_store_deletes_nothing() {
        let store = InMemoryResourceStore::new(ResourceKind::VectorIndex);
        let report = sweep_expired(&store, Duration::from_secs(60), TIMEOUT, CleanupSource::Manual, None)
            .await
            .unwrap();
        assert_eq!(report.deleted, 0);
    }

    #[tokio::test]
    async fn test_sweep_reports_unavailable_store() {
        let store = FailingStore::new(ResourceKind::BlobStorage);
        let err = sweep_expired(&store, Duration::from_secs(60), TIMEOUT, CleanupSource::TtlSweep, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable { .. }));
        assert_eq!(store.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_times_out() {
        let store = SlowStore::new(ResourceKind::BlobStorage, Duration::from_secs(60));
        let err = sweep_expired(&store, Duration::from_secs(60), Duration::from_secs(1), CleanupSource::Queue, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TimedOut(_)));
        assert_eq!(store.completed_calls(), 0);
    }

    #[tokio::test]
    async fn test_delete_one_is_idempotent() {
        let store = InMemoryResourceStore::new(ResourceKind::BlobStorage);
        store.insert("blob-1", 1024);

        delete_one(&store, "blob-1", TIMEOUT, CleanupSource::Queue, None).await.unwrap();
        delete_one(&store, "blob-1", TIMEOUT, CleanupSource::Queue, None).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_drops_dedup_records_of_deleted_artifacts() {
        let dedup = DeduplicationIndex::new(Arc::new(InMemoryDedupCatalog::new()), TIMEOUT);
        let hash = ContentHash::of(b"contract.pdf");
        dedup.register("u1", &hash, "a1").await.unwrap();
        dedup.register("u1", &ContentHash::of(b"fresh.pdf"), "a2").await.unwrap();

        let store = InMemoryResourceStore::new(ResourceKind::BlobStorage);
        store.insert_with_age("a1", 1024, Duration::from_secs(31 * 86400));
        store.insert("a2", 1024);

        let report = sweep_expired(
            &store,
            Duration::from_secs(30 * 86400),
            TIMEOUT,
            CleanupSource::TtlSweep,
            Some(&dedup),
        )
        .await
        .unwrap();

        assert_eq!(report.deleted, 1);
        assert!(dedup.lookup("u1", &hash).await.unwrap().is_none());
        assert_eq!(
            dedup.lookup("u1", &ContentHash::of(b"fresh.pdf")).await.unwrap().as_deref(),
            Some("a2")
        );
    }

    #[tokio::test]
    async fn test_unreachable_catalog_keeps_artifact() {
        let dedup = DeduplicationIndex::new(Arc::new(UnavailableCatalog::new()), TIMEOUT);
        let store = InMemoryResourceStore::new(ResourceKind::VectorIndex);
        store.insert("a1", 6144);

        let err = delete_one(&store, "a1", TIMEOUT, CleanupSource::Queue, Some(&dedup))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::StoreUnavailable { .. }));
        assert!(store.contains("a1"));
    }
}
