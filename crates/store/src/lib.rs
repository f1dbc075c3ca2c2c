#![deny(unused)]
//! Backing store adapters for the lifecycle manager.
//!
//! One adapter per store profile: Redis for the ephemeral cache, Qdrant for
//! the vector index, S3 for blobs and SQLite for the content-addressed
//! metadata catalog. The in-memory adapters back any kind whose external
//! store is not configured, and every test.

pub mod memory;
pub mod qdrant;
pub mod redis;
pub mod s3;
pub mod sqlite;

use chrono::{DateTime, Utc};
use std::time::Duration;

pub use memory::{InMemoryDedupCatalog, InMemoryResourceStore};
pub use qdrant::{QdrantConfig, QdrantVectorStore};
pub use self::redis::RedisCacheStore;
pub use s3::S3BlobStore;
pub use sqlite::SqliteCatalog;

/// Age of something created at `created_at`, clamped at zero for clock skew.
pub(crate) fn age_since(created_at: DateTime<Utc>) -> Duration {
    (Utc::now() - created_at).to_std().unwrap_or(Duration::ZERO)
}

/// Unix seconds before which an item counts as older than `age`.
/// Saturates so an absurd `age` selects nothing.
pub(crate) fn cutoff_secs(age: Duration) -> i64 {
    let age = i64::try_from(age.as_secs()).unwrap_or(i64::MAX);
    Utc::now().timestamp().saturating_sub(age)
}
