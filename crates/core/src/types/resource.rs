//! Backing store categories and their computed utilization.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::types::CleanupPriority;

/// Backing store category. Each kind has its own TTL, sweep interval and
/// soft capacity limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Cached text segments (Redis).
    EphemeralCache,
    /// Vector embeddings (Qdrant).
    VectorIndex,
    /// Uploaded blobs (S3).
    BlobStorage,
    /// Content-addressed metadata records (SQLite).
    MetadataCatalog,
}

impl ResourceKind {
    /// Every kind, in a stable order.
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::EphemeralCache,
        ResourceKind::VectorIndex,
        ResourceKind::BlobStorage,
        ResourceKind::MetadataCatalog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::EphemeralCache => "ephemeral_cache",
            ResourceKind::VectorIndex => "vector_index",
            ResourceKind::BlobStorage => "blob_storage",
            ResourceKind::MetadataCatalog => "metadata_catalog",
        }
    }

    /// Which observation is compared against the soft limit. Fixed per kind.
    pub fn limit_basis(&self) -> LimitBasis {
        match self {
            ResourceKind::BlobStorage => LimitBasis::Bytes,
            _ => LimitBasis::Count,
        }
    }

    /// Whether ids in this store are dedup artifact ids. Deleting one of them
    /// drops the dedup records that point at it.
    pub fn holds_artifacts(&self) -> bool {
        matches!(self, ResourceKind::VectorIndex | ResourceKind::BlobStorage)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::invalid_request(format!("unknown resource kind: {}", s)))
    }
}

/// Denominator used for a kind's utilization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitBasis {
    /// `observedCount / softLimit`.
    Count,
    /// `observedSize / softLimit`.
    Bytes,
}

/// Raw observation of a store, before it is compared with its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreSample {
    pub total_items: u64,
    pub size_bytes: u64,
    pub oldest_item_age_secs: u64,
}

impl StoreSample {
    /// The observation that is compared with the soft limit.
    pub fn observed(&self, basis: LimitBasis) -> u64 {
        match basis {
            LimitBasis::Count => self.total_items,
            LimitBasis::Bytes => self.size_bytes,
        }
    }
}

/// Computed (never stored) utilization of one kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    pub kind: ResourceKind,
    pub total_items: u64,
    pub size_bytes: u64,
    /// Ratio of the observation to the configured soft limit (0.9 == 90%).
    pub usage_percentage: f64,
    pub priority: CleanupPriority,
    pub oldest_item_age_seconds: u64,
}

impl ResourceMetrics {
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }

    pub fn oldest_age_hours(&self) -> f64 {
        self.oldest_item_age_seconds as f64 / 3600.0
    }
}
