//! Vector store trait and types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{CollectionInfo, Error, Metadata, Result, RetrievedDocument};

/// Supported vector store backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreBackend {
    /// In-process store, exact scan
    Memory,
    /// Qdrant over gRPC
    Qdrant,
    /// PostgreSQL with the `vector` extension
    PgVector,
}

impl VectorStoreBackend {
    /// Parse from a configuration string
    pub fn parse(s: &str) -> Option<VectorStoreBackend> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "local" => Some(VectorStoreBackend::Memory),
            "qdrant" | "qdrant_db" => Some(VectorStoreBackend::Qdrant),
            "pgvector" | "pg_vector" | "postgres" => Some(VectorStoreBackend::PgVector),
            _ => None,
        }
    }
}

/// A batch of points to upsert, as parallel columns.
///
/// `texts`, `vectors` and `record_ids` must have equal length. `metadatas`
/// may be empty, in which case every point gets null metadata.
#[derive(Debug, Clone, Default)]
pub struct InsertBatch {
    pub texts: Vec<String>,
    pub vectors: Vec<Vec<f32>>,
    pub metadatas: Vec<Option<Metadata>>,
    pub record_ids: Vec<i64>,
}

impl InsertBatch {
    pub fn len(&self) -> usize {
        self.record_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record_ids.is_empty()
    }

    /// Check the parallel-column precondition and fill missing metadata.
    pub fn validate(mut self, collection: &str) -> Result<InsertBatch> {
        let n = self.record_ids.len();
        if self.texts.len() != n || self.vectors.len() != n {
            return Err(Error::InvalidInput(format!(
                "texts ({}), vectors ({}) and record_ids ({}) must have the same length for {}",
                self.texts.len(),
                self.vectors.len(),
                n,
                collection
            )));
        }
        if self.metadatas.is_empty() {
            self.metadatas = vec![None; n];
        } else if self.metadatas.len() != n {
            return Err(Error::InvalidInput(format!(
                "metadatas ({}) must be empty or match record_ids ({}) for {}",
                self.metadatas.len(),
                n,
                collection
            )));
        }
        Ok(self)
    }

    /// Check every vector against the collection dimension
    pub fn check_dimension(&self, collection: &str, expected: usize) -> Result<()> {
        match self.vectors.iter().find(|v| v.len() != expected) {
            Some(bad) => Err(Error::DimensionMismatch {
                collection: collection.to_string(),
                expected,
                actual: bad.len(),
            }),
            None => Ok(()),
        }
    }
}

/// Trait for vector stores (e.g., Qdrant, pgvector, in-memory)
///
/// Every backend upserts by record id, reports a missing collection as
/// [`Error::CollectionNotFound`], and returns search hits ordered by
/// descending score.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend identity
    fn backend(&self) -> VectorStoreBackend;

    /// Open the backend connection. Called once at startup.
    async fn connect(&mut self) -> Result<()>;

    /// Close the backend connection. A no-op when not connected.
    async fn disconnect(&mut self) -> Result<()>;

    /// Check whether a collection exists
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// List all collection names
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Describe a collection
    async fn collection_info(&self, name: &str) -> Result<CollectionInfo>;

    /// Create a collection. With `reset`, an existing one is dropped first.
    /// Returns `true` only when a new collection was created.
    async fn create_collection(&self, name: &str, dimension: usize, reset: bool) -> Result<bool>;

    /// Delete a collection. Returns `false` if it did not exist.
    async fn delete_collection(&self, name: &str) -> Result<bool>;

    /// Upsert points in batches of `batch_size`
    async fn insert_many(&self, collection: &str, batch: InsertBatch, batch_size: usize) -> Result<()>;

    /// Upsert a single point
    async fn insert_one(
        &self,
        collection: &str,
        text: &str,
        vector: Vec<f32>,
        metadata: Option<Metadata>,
        record_id: i64,
    ) -> Result<()> {
        let batch = InsertBatch {
            texts: vec![text.to_string()],
            vectors: vec![vector],
            metadatas: vec![metadata],
            record_ids: vec![record_id],
        };
        self.insert_many(collection, batch, 1).await
    }

    /// Return at most `top_k` nearest points, best first
    async fn search_by_vector(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedDocument>>;
}
