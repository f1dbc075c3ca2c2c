//! Deduplication catalog trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ContentHash, DedupRecord, RegisterOutcome};

/// Durable `(owner, content hash) -> artifact` mapping.
#[async_trait]
pub trait DedupCatalog: Send + Sync {
    /// Exact-match lookup, scoped to one owner.
    async fn lookup(&self, owner_id: &str, hash: &ContentHash) -> Result<Option<DedupRecord>>;

    /// Atomically store `record` unless a record for the same
    /// `(owner, hash)` exists, in which case the existing one is returned.
    async fn insert_if_absent(&self, record: DedupRecord) -> Result<RegisterOutcome>;

    /// Remove every record pointing at `artifact_id`. Returns how many were removed.
    async fn remove_artifact(&self, artifact_id: &str) -> Result<usize>;
}
