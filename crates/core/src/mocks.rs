//! Mock implementations of core traits for testing.
//!
//! These stand in for misbehaving backends: stores that are down, stores that
//! hang, and a dedup catalog that cannot be reached.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::{
    traits::{DedupCatalog, ResourceStoreAdapter},
    types::{ContentHash, DedupRecord, RegisterOutcome, ResourceKind},
    Error, Result,
};

// =============================================================================
// Failing Store
// =============================================================================

/// Adapter whose every call fails with `StoreUnavailable`.
pub struct FailingStore {
    kind: ResourceKind,
    calls: AtomicUsize,
}

impl FailingStore {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of calls attempted against this store.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self, op: &str) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::unavailable(self.kind.as_str(), format!("{} refused: connection reset", op)))
    }
}

#[async_trait]
impl ResourceStoreAdapter for FailingStore {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    async fn count(&self) -> Result<u64> {
        self.fail("count")
    }

    async fn size_bytes(&self) -> Result<u64> {
        self.fail("size_bytes")
    }

    async fn oldest_item_age(&self) -> Result<Option<Duration>> {
        self.fail("oldest_item_age")
    }

    async fn list_older_than(&self, _age: Duration) -> Result<Vec<String>> {
        self.fail("list_older_than")
    }

    async fn delete(&self, _id: &str) -> Result<()> {
        self.fail("delete")
    }
}

// =============================================================================
// Slow Store
// =============================================================================

/// Adapter that sleeps before answering every call. Returns an empty store.
pub struct SlowStore {
    kind: ResourceKind,
    delay: Duration,
    completed: AtomicUsize,
}

impl SlowStore {
    pub fn new(kind: ResourceKind, delay: Duration) -> Self {
        Self {
            kind,
            delay,
            completed: AtomicUsize::new(0),
        }
    }

    /// Calls that ran to completion (were not cancelled by a timeout).
    pub fn completed_calls(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ResourceStoreAdapter for SlowStore {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    async fn count(&self) -> Result<u64> {
        self.pause().await;
        Ok(0)
    }

    async fn size_bytes(&self) -> Result<u64> {
        self.pause().await;
        Ok(0)
    }

    async fn oldest_item_age(&self) -> Result<Option<Duration>> {
        self.pause().await;
        Ok(None)
    }

    async fn list_older_than(&self, _age: Duration) -> Result<Vec<String>> {
        self.pause().await;
        Ok(Vec::new())
    }

    async fn delete(&self, _id: &str) -> Result<()> {
        self.pause().await;
        Ok(())
    }
}

// =============================================================================
// Unavailable Catalog
// =============================================================================

/// Dedup catalog that is always unreachable.
#[derive(Default)]
pub struct UnavailableCatalog {
    calls: AtomicUsize,
}

impl UnavailableCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::unavailable("dedup_catalog", "catalog offline"))
    }
}

#[async_trait]
impl DedupCatalog for UnavailableCatalog {
    async fn lookup(&self, _owner_id: &str, _hash: &ContentHash) -> Result<Option<DedupRecord>> {
        self.fail()
    }

    async fn insert_if_absent(&self, _record: DedupRecord) -> Result<RegisterOutcome> {
        self.fail()
    }

    async fn remove_artifact(&self, _artifact_id: &str) -> Result<usize> {
        self.fail()
    }
}
