//! Content-addressed deduplication records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{Error, Result};

/// Lower-case hex SHA-256 digest of raw input bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash raw input bytes.
    pub fn of(bytes: impl AsRef<[u8]>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes.as_ref());
        Self(hex::encode(hasher.finalize()))
    }

    /// Accept a digest computed elsewhere. Must be 64 hex characters.
    pub fn parse(digest: &str) -> Result<Self> {
        let normalized = digest.trim().to_ascii_lowercase();
        let valid = normalized.len() == 64 && normalized.bytes().all(|b| b.is_ascii_hexdigit());
        if !valid {
            return Err(Error::invalid_request(format!(
                "content hash must be a 64-character hex SHA-256 digest, got {:?}",
                digest
            )));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps `(owner, content hash)` to the artifact already produced for it.
/// At most one record exists per pair; records are never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupRecord {
    pub content_hash: ContentHash,
    pub owner_id: String,
    pub artifact_id: String,
    pub created_at: DateTime<Utc>,
}

impl DedupRecord {
    pub fn new(owner_id: impl Into<String>, content_hash: ContentHash, artifact_id: impl Into<String>) -> Self {
        Self {
            content_hash,
            owner_id: owner_id.into(),
            artifact_id: artifact_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// Result of an insert-if-absent against the dedup catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The record was stored; the caller's artifact is canonical.
    Inserted(DedupRecord),
    /// Another writer got there first; the caller must use this record's artifact.
    Existing(DedupRecord),
}

impl RegisterOutcome {
    pub fn record(&self) -> &DedupRecord {
        match self {
            RegisterOutcome::Inserted(record) | RegisterOutcome::Existing(record) => record,
        }
    }

    pub fn artifact_id(&self) -> &str {
        &self.record().artifact_id
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, RegisterOutcome::Inserted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_sha256_hex() {
        let hash = ContentHash::of(b"hello world");
        assert_eq!(
            hash.as_str(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(ContentHash::of(b"hello world"), hash);
        assert_ne!(ContentHash::of(b"hello world!"), hash);
    }

    #[test]
    fn test_parse_normalizes_and_validates() {
        let upper = "B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9";
        assert_eq!(ContentHash::parse(upper).unwrap(), ContentHash::of(b"hello world"));
        assert!(ContentHash::parse("abc").is_err());
        assert!(ContentHash::parse(&"z".repeat(64)).is_err());
    }
}
