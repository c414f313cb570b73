//! Qdrant vector store

use async_trait::async_trait;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfig;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder, UpsertPointsBuilder,
    Value, VectorParamsBuilder, value::Kind,
};
use qdrant_client::{Payload, Qdrant, QdrantError, qdrant};
use serde_json::json;
use std::collections::HashMap;

use minirag_core::{
    CollectionInfo, DistanceMetric, Error, InsertBatch, Metadata, Result, RetrievedDocument,
    VectorStore, VectorStoreBackend,
};

const TEXT_FIELD: &str = "text";
const METADATA_FIELD: &str = "metadata";

fn qdrant_distance(distance: DistanceMetric) -> Distance {
    match distance {
        DistanceMetric::Cosine => Distance::Cosine,
        DistanceMetric::Dot => Distance::Dot,
        DistanceMetric::Euclidean => Distance::Euclid,
    }
}

fn qdrant_error(e: QdrantError) -> Error {
    Error::VectorStore(format!("Qdrant error: {}", e))
}

/// Qdrant reports a missing collection as a gRPC `NotFound` status.
fn is_not_found(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("not found") || message.contains("notfound") || message.contains("doesn't exist")
}

fn vector_size(info: &qdrant::CollectionInfo) -> Option<usize> {
    info.config
        .as_ref()
        .and_then(|c| c.params.as_ref())
        .and_then(|p| p.vectors_config.as_ref())
        .and_then(|v| v.config.as_ref())
        .and_then(|config| match config {
            VectorsConfig::Params(params) => Some(params.size as usize),
            _ => None,
        })
}

fn describe(name: &str, distance: DistanceMetric, info: &qdrant::CollectionInfo) -> CollectionInfo {
    CollectionInfo {
        name: name.to_string(),
        dimension: vector_size(info),
        distance,
        points_count: info.points_count.unwrap_or(0),
        indexed: info.indexed_vectors_count.is_some_and(|n| n > 0),
    }
}

fn point_id(record_id: i64) -> Result<u64> {
    u64::try_from(record_id).map_err(|_| {
        Error::InvalidInput(format!("Qdrant point ids must be non-negative, got {}", record_id))
    })
}

fn point_payload(text: &str, metadata: Option<&Metadata>) -> Result<Payload> {
    Payload::try_from(json!({
        TEXT_FIELD: text,
        METADATA_FIELD: metadata,
    }))
    .map_err(qdrant_error)
}

/// Stored text of a hit; empty when the payload carries none.
fn payload_text(payload: &HashMap<String, Value>) -> String {
    payload
        .get(TEXT_FIELD)
        .and_then(|v| match v {
            Value { kind: Some(Kind::StringValue(s)) } => Some(s.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

/// Qdrant returns raw distances for Euclid (lower is better); flip them so
/// every metric ranks by descending score.
fn normalize_score(distance: DistanceMetric, score: f32) -> f32 {
    match distance {
        DistanceMetric::Euclidean => -score,
        _ => score,
    }
}

/// Qdrant-backed store over gRPC
pub struct QdrantVectorStore {
    url: String,
    distance: DistanceMetric,
    client: Option<Qdrant>,
}

impl QdrantVectorStore {
    pub fn new(url: impl Into<String>, distance: DistanceMetric) -> Self {
        Self {
            url: url.into(),
            distance,
            client: None,
        }
    }

    fn client(&self) -> Result<&Qdrant> {
        self.client
            .as_ref()
            .ok_or_else(|| Error::VectorStore("Qdrant store is not connected".to_string()))
    }

    /// One `collection_info` round trip; a missing collection maps to
    /// `CollectionNotFound`.
    async fn fetch_info(&self, name: &str) -> Result<qdrant::CollectionInfo> {
        let response = self.client()?.collection_info(name).await.map_err(|e| {
            if is_not_found(&e.to_string()) {
                tracing::error!(collection = name, "collection does not exist");
                Error::CollectionNotFound(name.to_string())
            } else {
                qdrant_error(e)
            }
        })?;
        response
            .result
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))
    }

    async fn ensure_exists(&self, name: &str) -> Result<()> {
        if self.collection_exists(name).await? {
            Ok(())
        } else {
            tracing::error!(collection = name, "collection does not exist");
            Err(Error::CollectionNotFound(name.to_string()))
        }
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    fn backend(&self) -> VectorStoreBackend {
        VectorStoreBackend::Qdrant
    }

    async fn connect(&mut self) -> Result<()> {
        let client = Qdrant::from_url(&self.url)
            .build()
            .map_err(|e| Error::Network(format!("Qdrant client for {}: {}", self.url, e)))?;
        client
            .health_check()
            .await
            .map_err(|e| Error::Network(format!("Qdrant at {} unreachable: {}", self.url, e)))?;

        tracing::info!(url = %self.url, "connected to Qdrant");
        self.client = Some(client);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.client.take().is_some() {
            tracing::info!("disconnected from Qdrant");
        }
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.client()?
            .collection_exists(name)
            .await
            .map_err(qdrant_error)
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let response = self
            .client()?
            .list_collections()
            .await
            .map_err(qdrant_error)?;
        let mut names: Vec<String> = response.collections.into_iter().map(|c| c.name).collect();
        names.sort();
        Ok(names)
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
        let info = self.fetch_info(name).await?;
        Ok(describe(name, self.distance, &info))
    }

    async fn create_collection(&self, name: &str, dimension: usize, reset: bool) -> Result<bool> {
        if reset {
            self.delete_collection(name).await?;
        }
        if self.collection_exists(name).await? {
            return Ok(false);
        }

        tracing::info!(collection = name, dimension, "creating collection");
        self.client()?
            .create_collection(
                CreateCollectionBuilder::new(name).vectors_config(VectorParamsBuilder::new(
                    dimension as u64,
                    qdrant_distance(self.distance),
                )),
            )
            .await
            .map_err(qdrant_error)?;
        Ok(true)
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        if !self.collection_exists(name).await? {
            tracing::warn!(collection = name, "collection does not exist, nothing to delete");
            return Ok(false);
        }
        self.client()?
            .delete_collection(name)
            .await
            .map_err(qdrant_error)?;
        Ok(true)
    }

    async fn insert_many(&self, collection: &str, batch: InsertBatch, batch_size: usize) -> Result<()> {
        let batch = batch.validate(collection)?;
        let info = self.fetch_info(collection).await?;
        if let Some(dimension) = vector_size(&info) {
            batch.check_dimension(collection, dimension)?;
        }

        let mut points = Vec::with_capacity(batch.len());
        for i in 0..batch.len() {
            points.push(PointStruct::new(
                point_id(batch.record_ids[i])?,
                batch.vectors[i].clone(),
                point_payload(&batch.texts[i], batch.metadatas[i].as_ref())?,
            ));
        }

        let total = points.len();
        let mut committed = 0;
        for chunk in points.chunks(batch_size.max(1)) {
            let result = self
                .client()?
                .upsert_points(UpsertPointsBuilder::new(collection, chunk.to_vec()).wait(true))
                .await;

            if let Err(e) = result {
                tracing::error!(collection, committed, total, "batch upsert failed: {}", e);
                if committed == 0 {
                    return Err(qdrant_error(e));
                }
                return Err(Error::PartialInsert {
                    collection: collection.to_string(),
                    committed,
                    total,
                    reason: e.to_string(),
                });
            }
            committed += chunk.len();
        }

        tracing::debug!(collection, total, "points upserted");
        Ok(())
    }

    async fn search_by_vector(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedDocument>> {
        self.ensure_exists(collection).await?;
        let response = self
            .client()?
            .search_points(
                SearchPointsBuilder::new(collection, vector.to_vec(), top_k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(qdrant_error)?;

        let mut results: Vec<RetrievedDocument> = response
            .result
            .into_iter()
            .map(|point| RetrievedDocument {
                text: payload_text(&point.payload),
                score: normalize_score(self.distance, point.score),
            })
            .collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(results)
    }
}
