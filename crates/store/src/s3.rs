//! S3 implementation of the blob storage store.

use async_trait::async_trait;
use aws_sdk_s3::{primitives::ByteStream, Client};
use bytes::Bytes;
use chrono::Utc;
use std::time::Duration;

use lifecycle_core::{
    traits::ResourceStoreAdapter,
    types::{ResourceKind, StoreSample},
    Error, Result,
};

use crate::cutoff_secs;

const KIND: ResourceKind = ResourceKind::BlobStorage;

/// One object from a bucket listing.
#[derive(Debug, Clone)]
struct ObjectSummary {
    id: String,
    size: u64,
    /// Unix seconds, when S3 reported it.
    last_modified: Option<i64>,
}

/// S3 storage for uploaded blobs.
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3BlobStore {
    /// Create a new S3 blob store from the ambient AWS configuration.
    ///
    /// A custom `endpoint` (MinIO, LocalStack) switches to path-style addressing.
    pub async fn new(bucket: &str, prefix: &str, endpoint: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(endpoint.is_some())
            .build();

        Self::new_with_client(Client::from_conf(s3_config), bucket, prefix)
    }

    /// Create with custom client (for testing/custom config).
    pub fn new_with_client(client: Client, bucket: &str, prefix: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    fn key(&self, id: &str) -> String {
        if self.prefix.is_empty() {
            id.to_string()
        } else {
            format!("{}/{}", self.prefix, id)
        }
    }

    fn id_from_key<'a>(&self, key: &'a str) -> &'a str {
        if self.prefix.is_empty() {
            key
        } else {
            key.strip_prefix(&format!("{}/", self.prefix)).unwrap_or(key)
        }
    }

    /// Upload a blob. Called by the ingestion path.
    pub async fn put(&self, id: &str, data: Bytes, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.key(id))
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| Error::unavailable(KIND.as_str(), format!("S3 upload error: {}", e)))?;

        Ok(())
    }

    /// Walk every page of the listing under the prefix.
    async fn list_objects(&self) -> Result<Vec<ObjectSummary>> {
        let list_prefix = if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.prefix)
        };

        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(list_prefix)
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| Error::unavailable(KIND.as_str(), format!("S3 list error: {}", e)))?;

            for object in page.contents() {
                let Some(key) = object.key() else {
                    continue;
                };
                objects.push(ObjectSummary {
                    id: self.id_from_key(key).to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: object.last_modified().map(|d| d.secs()),
                });
            }
        }

        Ok(objects)
    }
}

/// Fold one listing into a sample.
fn summarize(objects: &[ObjectSummary], now: i64) -> StoreSample {
    StoreSample {
        total_items: objects.len() as u64,
        size_bytes: objects.iter().map(|o| o.size).sum(),
        oldest_item_age_secs: oldest_age(objects, now).map(|age| age.as_secs()).unwrap_or(0),
    }
}

fn oldest_age(objects: &[ObjectSummary], now: i64) -> Option<Duration> {
    objects
        .iter()
        .filter_map(|o| o.last_modified)
        .min()
        .map(|oldest| Duration::from_secs((now - oldest).max(0) as u64))
}

#[async_trait]
impl ResourceStoreAdapter for S3BlobStore {
    fn kind(&self) -> ResourceKind {
        KIND
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.list_objects().await?.len() as u64)
    }

    async fn size_bytes(&self) -> Result<u64> {
        Ok(self.list_objects().await?.iter().map(|o| o.size).sum())
    }

    async fn oldest_item_age(&self) -> Result<Option<Duration>> {
        Ok(oldest_age(&self.list_objects().await?, Utc::now().timestamp()))
    }

    /// One listing walk serves all three observations.
    async fn sample(&self) -> Result<StoreSample> {
        Ok(summarize(&self.list_objects().await?, Utc::now().timestamp()))
    }

    async fn list_older_than(&self, age: Duration) -> Result<Vec<String>> {
        let cutoff = cutoff_secs(age);
        Ok(self
            .list_objects()
            .await?
            .into_iter()
            .filter(|o| o.last_modified.is_some_and(|modified| modified < cutoff))
            .map(|o| o.id)
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        // DeleteObject answers 204 for keys that do not exist.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.key(id))
            .send()
            .await
            .map_err(|e| Error::unavailable(KIND.as_str(), format!("S3 delete error: {}", e)))?;

        Ok(())
    }
}
