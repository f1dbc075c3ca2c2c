//! Owner-scoped content-hash index in front of the dedup catalog.

use std::sync::Arc;
use std::time::Duration;

use lifecycle_core::{
    traits::DedupCatalog,
    types::{ContentHash, DedupRecord, RegisterOutcome},
    Result,
};

use crate::bounded;

/// Exact-match `(owner, hash) -> artifact` lookups. Every catalog call is
/// bounded by the operation timeout.
///
/// Errors are returned as-is; deciding to fail open is up to the caller.
pub struct DeduplicationIndex {
    catalog: Arc<dyn DedupCatalog>,
    timeout: Duration,
}

impl DeduplicationIndex {
    pub fn new(catalog: Arc<dyn DedupCatalog>, timeout: Duration) -> Self {
        Self { catalog, timeout }
    }

    /// Artifact already produced for this owner and content, if any.
    pub async fn lookup(&self, owner_id: &str, hash: &ContentHash) -> Result<Option<String>> {
        let record = bounded(self.timeout, "dedup lookup", self.catalog.lookup(owner_id, hash)).await?;
        Ok(record.map(|r| r.artifact_id))
    }

    /// Atomic insert-if-absent. `Existing` carries the winner when another
    /// registration got there first.
    pub async fn register(&self, owner_id: &str, hash: &ContentHash, artifact_id: &str) -> Result<RegisterOutcome> {
        let record = DedupRecord::new(owner_id, hash.clone(), artifact_id);
        bounded(self.timeout, "dedup register", self.catalog.insert_if_absent(record)).await
    }

    /// Drop every record pointing at `artifact_id`. Returns how many were removed.
    pub async fn forget_artifact(&self, artifact_id: &str) -> Result<usize> {
        bounded(self.timeout, "dedup forget", self.catalog.remove_artifact(artifact_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifecycle_core::{mocks::UnavailableCatalog, Error};
    use lifecycle_store::InMemoryDedupCatalog;

    fn index() -> DeduplicationIndex {
        DeduplicationIndex::new(Arc::new(InMemoryDedupCatalog::new()), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_lookup_is_owner_scoped() {
        let index = index();
        let hash = ContentHash::of(b"same bytes");

        assert!(index.register("u1", &hash, "a1").await.unwrap().is_inserted());

        assert_eq!(index.lookup("u1", &hash).await.unwrap().as_deref(), Some("a1"));
        assert!(index.lookup("u2", &hash).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_register_returns_winner() {
        let index = index();
        let hash = ContentHash::of(b"race");

        index.register("u1", &hash, "a1").await.unwrap();
        let outcome = index.register("u1", &hash, "a2").await.unwrap();

        assert!(!outcome.is_inserted());
        assert_eq!(outcome.artifact_id(), "a1");
    }

    #[tokio::test]
    async fn test_forget_artifact_removes_records() {
        let index = index();
        index.register("u1", &ContentHash::of(b"x"), "a1").await.unwrap();
        index.register("u2", &ContentHash::of(b"x"), "a1").await.unwrap();

        assert_eq!(index.forget_artifact("a1").await.unwrap(), 2);
        assert_eq!(index.forget_artifact("a1").await.unwrap(), 0);
        assert!(index.lookup("u1", &ContentHash::of(b"x")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unavailable_catalog_surfaces_error() {
        let index = DeduplicationIndex::new(Arc::new(UnavailableCatalog::new()), Duration::from_secs(1));

        let err = index.lookup("u1", &ContentHash::of(b"x")).await.unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable { .. }));
    }
}
