//! Backing store adapter trait.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::types::{ResourceKind, StoreSample};

/// Thin interface the manager uses to observe and reclaim one backing store.
///
/// Implementations must not block forever, but bounding each call with a
/// timeout is the caller's job. The stores themselves are never locked by the
/// manager: deletes run concurrently with the rest of the application's reads.
#[async_trait]
pub trait ResourceStoreAdapter: Send + Sync {
    /// The kind of store this adapter fronts.
    fn kind(&self) -> ResourceKind;

    /// Number of items currently held.
    async fn count(&self) -> Result<u64>;

    /// Approximate bytes currently held.
    async fn size_bytes(&self) -> Result<u64>;

    /// Age of the oldest item, or `None` when the store is empty.
    async fn oldest_item_age(&self) -> Result<Option<Duration>>;

    /// Count, size and oldest age in one observation. The default runs the
    /// three queries concurrently; stores that pay per listing override it.
    async fn sample(&self) -> Result<StoreSample> {
        let (total_items, size_bytes, oldest) =
            futures::try_join!(self.count(), self.size_bytes(), self.oldest_item_age())?;
        Ok(StoreSample {
            total_items,
            size_bytes,
            oldest_item_age_secs: oldest.map(|age| age.as_secs()).unwrap_or(0),
        })
    }

    /// Ids of every item created more than `age` ago.
    async fn list_older_than(&self, age: Duration) -> Result<Vec<String>>;

    /// Delete an item. Deleting an id that is already gone (or never existed)
    /// succeeds as a no-op.
    async fn delete(&self, id: &str) -> Result<()>;
}
