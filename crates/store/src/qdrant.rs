//! Qdrant implementation of the vector index store.
//!
//! Every point carries an integer `created_at` payload (unix seconds) with a
//! payload index, so age queries are range filters instead of full scans.

use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, value::Kind, vectors_config::Config as VectorsConfigEnum, Condition,
    CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DeletePointsBuilder, Direction,
    Distance, FieldType, Filter, OrderBy, PointId, PointStruct, PointsIdsList, Range, ScrollPointsBuilder,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder, VectorsConfig,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use lifecycle_core::{traits::ResourceStoreAdapter, types::ResourceKind, Error, Result};

use crate::cutoff_secs;

const KIND: ResourceKind = ResourceKind::VectorIndex;
const CREATED_AT_FIELD: &str = "created_at";
const SCROLL_PAGE: u32 = 256;

/// Qdrant-backed vector index.
pub struct QdrantVectorStore {
    client: Qdrant,
    collection_name: String,
    vector_size: u64,
}

impl QdrantVectorStore {
    /// Connect and make sure the collection and its `created_at` index exist.
    pub async fn new(config: &QdrantConfig) -> Result<Self> {
        let client = Qdrant::from_url(&config.url)
            .build()
            .map_err(|e| Error::unavailable(KIND.as_str(), format!("Failed to connect to Qdrant: {}", e)))?;

        let store = Self {
            client,
            collection_name: config.collection_name.clone(),
            vector_size: config.vector_size,
        };

        store.ensure_collection().await?;

        Ok(store)
    }

    fn error(op: &str, e: qdrant_client::QdrantError) -> Error {
        Error::unavailable(KIND.as_str(), format!("Qdrant {} failed: {}", op, e))
    }

    /// Ensure the collection exists, creating it if necessary.
    async fn ensure_collection(&self) -> Result<()> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(|e| Self::error("list collections", e))?;

        let exists = collections.collections.iter().any(|c| c.name == self.collection_name);

        if !exists {
            tracing::info!(collection = %self.collection_name, "Creating Qdrant collection");

            let vectors_config = VectorsConfig {
                config: Some(VectorsConfigEnum::Params(
                    VectorParamsBuilder::new(self.vector_size, Distance::Cosine).build(),
                )),
            };

            self.client
                .create_collection(CreateCollectionBuilder::new(&self.collection_name).vectors_config(vectors_config))
                .await
                .map_err(|e| Self::error("create collection", e))?;

            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    &self.collection_name,
                    CREATED_AT_FIELD,
                    FieldType::Integer,
                ))
                .await
                .map_err(|e| Self::error("create payload index", e))?;
        }

        Ok(())
    }

    /// Store an embedding. `id` must be a UUID string. Called by the ingestion path.
    pub async fn upsert(&self, id: &str, embedding: Vec<f32>, document_id: &str) -> Result<()> {
        let mut payload = HashMap::new();
        payload.insert(
            CREATED_AT_FIELD.to_string(),
            QdrantValue {
                kind: Some(Kind::IntegerValue(Utc::now().timestamp())),
            },
        );
        payload.insert(
            "document_id".to_string(),
            QdrantValue {
                kind: Some(Kind::StringValue(document_id.to_string())),
            },
        );

        let point = PointStruct::new(id.to_string(), embedding, payload);

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection_name, vec![point]))
            .await
            .map_err(|e| Self::error("upsert", e))?;

        tracing::debug!(id = %id, "Added embedding to Qdrant");
        Ok(())
    }

    fn point_id_to_string(id: PointId) -> Option<String> {
        match id.point_id_options? {
            PointIdOptions::Uuid(uuid) => Some(uuid),
            PointIdOptions::Num(num) => Some(num.to_string()),
        }
    }

    /// Inverse of `point_id_to_string`: all-digit ids are numeric points.
    fn point_id_from_str(id: &str) -> PointId {
        let options = match id.parse::<u64>() {
            Ok(num) if id.bytes().all(|b| b.is_ascii_digit()) => PointIdOptions::Num(num),
            _ => PointIdOptions::Uuid(id.to_string()),
        };
        PointId {
            point_id_options: Some(options),
        }
    }

    fn created_at(payload: &HashMap<String, QdrantValue>) -> Option<i64> {
        match &payload.get(CREATED_AT_FIELD)?.kind {
            Some(Kind::IntegerValue(ts)) => Some(*ts),
            Some(Kind::DoubleValue(ts)) => Some(*ts as i64),
            _ => None,
        }
    }
}

#[async_trait]
impl ResourceStoreAdapter for QdrantVectorStore {
    fn kind(&self) -> ResourceKind {
        KIND
    }

    async fn count(&self) -> Result<u64> {
        let response = self
            .client
            .count(CountPointsBuilder::new(&self.collection_name).exact(true))
            .await
            .map_err(|e| Self::error("count", e))?;

        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    async fn size_bytes(&self) -> Result<u64> {
        // Dense f32 vectors dominate the footprint.
        Ok(self.count().await? * self.vector_size * 4)
    }

    async fn oldest_item_age(&self) -> Result<Option<Duration>> {
        let order_by = OrderBy {
            key: CREATED_AT_FIELD.to_string(),
            direction: Some(Direction::Asc.into()),
            ..Default::default()
        };

        let response = self
            .client
            .scroll(
                ScrollPointsBuilder::new(&self.collection_name)
                    .limit(1)
                    .with_payload(true)
                    .order_by(order_by),
            )
            .await
            .map_err(|e| Self::error("scroll", e))?;

        let now = Utc::now().timestamp();
        Ok(response
            .result
            .first()
            .and_then(|point| Self::created_at(&point.payload))
            .map(|created| Duration::from_secs((now - created).max(0) as u64)))
    }

    async fn list_older_than(&self, age: Duration) -> Result<Vec<String>> {
        let filter = Filter::must([Condition::range(
            CREATED_AT_FIELD,
            Range {
                lt: Some(cutoff_secs(age) as f64),
                ..Default::default()
            },
        )]);

        let mut ids = Vec::new();
        let mut offset: Option<PointId> = None;
        loop {
            let mut request = ScrollPointsBuilder::new(&self.collection_name)
                .filter(filter.clone())
                .limit(SCROLL_PAGE)
                .with_payload(false);
            if let Some(offset) = offset.take() {
                request = request.offset(offset);
            }

            let response = self
                .client
                .scroll(request)
                .await
                .map_err(|e| Self::error("scroll", e))?;

            ids.extend(
                response
                    .result
                    .into_iter()
                    .filter_map(|point| point.id.and_then(Self::point_id_to_string)),
            );

            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(ids)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        // Qdrant acknowledges deletes of absent points.
        self.client
            .delete_points(DeletePointsBuilder::new(&self.collection_name).points(PointsIdsList {
                ids: vec![Self::point_id_from_str(id)],
            }))
            .await
            .map_err(|e| Self::error("delete", e))?;

        tracing::debug!(id = %id, "Deleted embedding from Qdrant");
        Ok(())
    }
}

/// Configuration for Qdrant connection.
#[derive(Debug, Clone)]
pub struct QdrantConfig {
    /// Qdrant server URL.
    pub url: String,
    /// Collection name.
    pub collection_name: String,
    /// Vector dimension (e.g., 1536 for OpenAI embeddings).
    pub vector_size: u64,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            collection_name: "lifecycle_embeddings".to_string(),
            vector_size: 1536,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(id: &str) -> Option<PointIdOptions> {
        QdrantVectorStore::point_id_from_str(id).point_id_options
    }

    #[test]
    fn test_point_ids_round_trip_through_strings() {
        assert_eq!(options("42"), Some(PointIdOptions::Num(42)));
        assert_eq!(
            QdrantVectorStore::point_id_to_string(QdrantVectorStore::point_id_from_str("42")).as_deref(),
            Some("42")
        );

        let uuid = "5c56c793-69f3-4fbf-87e6-c4bf54c28c26";
        assert_eq!(options(uuid), Some(PointIdOptions::Uuid(uuid.to_string())));
        // Signs are not digits.
        assert_eq!(options("+7"), Some(PointIdOptions::Uuid("+7".to_string())));
    }
}
