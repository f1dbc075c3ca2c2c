//! In-memory adapters using DashMap.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::time::Duration;

use lifecycle_core::{
    traits::{DedupCatalog, ResourceStoreAdapter},
    types::{ContentHash, DedupRecord, RegisterOutcome, ResourceKind},
    Result,
};

use crate::age_since;

/// Stored item bookkeeping.
#[derive(Debug, Clone)]
struct StoredItem {
    /// Payload size.
    size_bytes: u64,
    /// Creation timestamp.
    created_at: DateTime<Utc>,
}

/// In-memory store for any resource kind.
///
/// Holds only size and creation time per id, which is everything the
/// lifecycle manager observes.
#[derive(Debug)]
pub struct InMemoryResourceStore {
    kind: ResourceKind,
    items: DashMap<String, StoredItem>,
}

impl InMemoryResourceStore {
    /// Create an empty store for `kind`.
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            items: DashMap::new(),
        }
    }

    /// Record a newly created item.
    pub fn insert(&self, id: impl Into<String>, size_bytes: u64) {
        self.insert_with_age(id, size_bytes, Duration::ZERO);
    }

    /// Record an item as if it had been created `age` ago.
    pub fn insert_with_age(&self, id: impl Into<String>, size_bytes: u64, age: Duration) {
        let created_at = Utc::now() - chrono::Duration::from_std(age).unwrap_or_else(|_| chrono::Duration::zero());
        let id = id.into();

        tracing::trace!(kind = %self.kind, id = %id, size_bytes, "Storing item in memory");

        self.items.insert(id, StoredItem { size_bytes, created_at });
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&self) {
        self.items.clear();
    }
}

#[async_trait]
impl ResourceStoreAdapter for InMemoryResourceStore {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.items.len() as u64)
    }

    async fn size_bytes(&self) -> Result<u64> {
        Ok(self.items.iter().map(|r| r.value().size_bytes).sum())
    }

    async fn oldest_item_age(&self) -> Result<Option<Duration>> {
        Ok(self
            .items
            .iter()
            .map(|r| r.value().created_at)
            .min()
            .map(age_since))
    }

    async fn list_older_than(&self, age: Duration) -> Result<Vec<String>> {
        Ok(self
            .items
            .iter()
            .filter(|r| age_since(r.value().created_at) > age)
            .map(|r| r.key().clone())
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.items.remove(id);
        Ok(())
    }
}

/// In-memory dedup catalog.
///
/// Also serves as the metadata catalog store when SQLite is not configured:
/// its items are artifact ids, and deleting one removes every record that
/// points at it.
#[derive(Debug, Default)]
pub struct InMemoryDedupCatalog {
    records: DashMap<(String, ContentHash), DedupRecord>,
}

impl InMemoryDedupCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn record_size(record: &DedupRecord) -> u64 {
        (record.owner_id.len() + record.content_hash.as_str().len() + record.artifact_id.len() + 8) as u64
    }
}

#[async_trait]
impl DedupCatalog for InMemoryDedupCatalog {
    async fn lookup(&self, owner_id: &str, hash: &ContentHash) -> Result<Option<DedupRecord>> {
        Ok(self
            .records
            .get(&(owner_id.to_string(), hash.clone()))
            .map(|r| r.value().clone()))
    }

    async fn insert_if_absent(&self, record: DedupRecord) -> Result<RegisterOutcome> {
        let key = (record.owner_id.clone(), record.content_hash.clone());
        // The entry guard holds the shard lock, so check and insert are one step.
        match self.records.entry(key) {
            Entry::Occupied(existing) => Ok(RegisterOutcome::Existing(existing.get().clone())),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(RegisterOutcome::Inserted(record))
            }
        }
    }

    async fn remove_artifact(&self, artifact_id: &str) -> Result<usize> {
        let before = self.records.len();
        self.records.retain(|_, record| record.artifact_id != artifact_id);
        Ok(before.saturating_sub(self.records.len()))
    }
}

#[async_trait]
impl ResourceStoreAdapter for InMemoryDedupCatalog {
    fn kind(&self) -> ResourceKind {
        ResourceKind::MetadataCatalog
    }

    /// Distinct artifacts, not records.
    async fn count(&self) -> Result<u64> {
        let artifacts: HashSet<String> = self.records.iter().map(|r| r.value().artifact_id.clone()).collect();
        Ok(artifacts.len() as u64)
    }

    async fn size_bytes(&self) -> Result<u64> {
        Ok(self.records.iter().map(|r| Self::record_size(r.value())).sum())
    }

    async fn oldest_item_age(&self) -> Result<Option<Duration>> {
        Ok(self
            .records
            .iter()
            .map(|r| r.value().created_at)
            .min()
            .map(age_since))
    }

    /// Records never expire by age; they go when their artifact is deleted.
    async fn list_older_than(&self, _age: Duration) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.remove_artifact(id).await.map(|_| ())
    }
}
