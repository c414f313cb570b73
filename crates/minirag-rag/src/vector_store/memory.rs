//! In-process vector store with exact scan

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use minirag_core::{
    CollectionInfo, DistanceMetric, Error, InsertBatch, Metadata, Result, RetrievedDocument,
    VectorStore, VectorStoreBackend,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPoint {
    text: String,
    vector: Vec<f32>,
    metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MemoryCollection {
    dimension: usize,
    distance: DistanceMetric,
    points: BTreeMap<i64, StoredPoint>,
}

/// Vector store keeping collections in memory.
///
/// Inserts are validated in full before anything is written, so a failing
/// call leaves the collection untouched.
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
    distance: DistanceMetric,
    data_file: Option<PathBuf>,
    connected: bool,
}

impl MemoryVectorStore {
    pub fn new(distance: DistanceMetric) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            distance,
            data_file: None,
            connected: false,
        }
    }

    /// Snapshot collections to `data_file`; loaded on `connect`.
    pub fn with_data_file(mut self, data_file: impl AsRef<Path>) -> Self {
        self.data_file = Some(data_file.as_ref().to_path_buf());
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn load_from_file(path: &Path) -> Result<HashMap<String, MemoryCollection>> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save_to_file(&self, collections: &HashMap<String, MemoryCollection>) -> Result<()> {
        if let Some(path) = &self.data_file {
            let content = serde_json::to_string(collections)?;
            fs::write(path, content)?;
        }
        Ok(())
    }

    fn lock_error<E: std::fmt::Display>(e: E) -> Error {
        Error::VectorStore(format!("Lock error: {}", e))
    }

    /// Score a point against the query; higher is better for every metric.
    fn score(distance: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
        match distance {
            DistanceMetric::Cosine => cosine_similarity(a, b),
            DistanceMetric::Dot => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            DistanceMetric::Euclidean => -a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
        }
    }
}

/// Cosine similarity; zero when either vector has no length
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    fn backend(&self) -> VectorStoreBackend {
        VectorStoreBackend::Memory
    }

    async fn connect(&mut self) -> Result<()> {
        if let Some(path) = &self.data_file {
            if path.exists() {
                let loaded = Self::load_from_file(path)?;
                tracing::info!(path = %path.display(), collections = loaded.len(), "loaded vector snapshot");
                *self.collections.write().map_err(Self::lock_error)? = loaded;
            }
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let collections = self.collections.read().map_err(Self::lock_error)?;
        Ok(collections.contains_key(name))
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let collections = self.collections.read().map_err(Self::lock_error)?;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
        let collections = self.collections.read().map_err(Self::lock_error)?;
        let collection = collections
            .get(name)
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))?;
        Ok(CollectionInfo {
            name: name.to_string(),
            dimension: Some(collection.dimension),
            distance: collection.distance,
            points_count: collection.points.len() as u64,
            indexed: false,
        })
    }

    async fn create_collection(&self, name: &str, dimension: usize, reset: bool) -> Result<bool> {
        if dimension == 0 {
            return Err(Error::InvalidInput(format!(
                "collection {} needs a positive dimension",
                name
            )));
        }
        let mut collections = self.collections.write().map_err(Self::lock_error)?;
        if reset && collections.remove(name).is_some() {
            tracing::info!(collection = name, "collection dropped for reset");
        }
        if collections.contains_key(name) {
            return Ok(false);
        }
        collections.insert(
            name.to_string(),
            MemoryCollection {
                dimension,
                distance: self.distance,
                points: BTreeMap::new(),
            },
        );
        self.save_to_file(&collections)?;
        tracing::info!(collection = name, dimension, "collection created");
        Ok(true)
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        let mut collections = self.collections.write().map_err(Self::lock_error)?;
        if collections.remove(name).is_none() {
            tracing::warn!(collection = name, "collection does not exist, nothing to delete");
            return Ok(false);
        }
        self.save_to_file(&collections)?;
        Ok(true)
    }

    async fn insert_many(&self, collection: &str, batch: InsertBatch, batch_size: usize) -> Result<()> {
        let batch = batch.validate(collection)?;
        let mut collections = self.collections.write().map_err(Self::lock_error)?;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;
        batch.check_dimension(collection, target.dimension)?;

        // One write regardless of batch_size, so the call stays atomic.
        let total = batch.len();
        let rows = batch
            .record_ids
            .into_iter()
            .zip(batch.texts)
            .zip(batch.vectors)
            .zip(batch.metadatas);
        let mut replaced: Vec<(i64, Option<StoredPoint>)> = Vec::with_capacity(total);
        for (((id, text), vector), metadata) in rows {
            let previous = target.points.insert(id, StoredPoint { text, vector, metadata });
            replaced.push((id, previous));
        }

        if let Err(e) = self.save_to_file(&collections) {
            tracing::error!(collection, total, "snapshot write failed, rolling back: {}", e);
            if let Some(target) = collections.get_mut(collection) {
                for (id, previous) in replaced.into_iter().rev() {
                    match previous {
                        Some(point) => target.points.insert(id, point),
                        None => target.points.remove(&id),
                    };
                }
            }
            return Err(e);
        }
        tracing::debug!(collection, total, batch_size, "points upserted");
        Ok(())
    }

    async fn search_by_vector(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedDocument>> {
        let collections = self.collections.read().map_err(Self::lock_error)?;
        let target = collections
            .get(collection)
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;
        if vector.len() != target.dimension {
            return Err(Error::DimensionMismatch {
                collection: collection.to_string(),
                expected: target.dimension,
                actual: vector.len(),
            });
        }

        let mut results: Vec<RetrievedDocument> = target
            .points
            .values()
            .map(|point| RetrievedDocument {
                text: point.text.clone(),
                score: Self::score(target.distance, vector, &point.vector),
            })
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(top_k);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(ids: &[i64], vectors: Vec<Vec<f32>>) -> InsertBatch {
        InsertBatch {
            texts: ids.iter().map(|id| format!("text {}", id)).collect(),
            vectors,
            metadatas: Vec::new(),
            record_ids: ids.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_round_trip_scores_one() {
        let store = MemoryVectorStore::new(DistanceMetric::Cosine);
        store.create_collection("collection_1", 3, false).await.unwrap();
        store
            .insert_one("collection_1", "tesla", vec![0.2, 0.4, 0.1], None, 1)
            .await
            .unwrap();

        let hits = store
            .search_by_vector("collection_1", &[0.2, 0.4, 0.1], 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "tesla");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_top_k_is_never_padded() {
        let store = MemoryVectorStore::new(DistanceMetric::Cosine);
        store.create_collection("c", 2, false).await.unwrap();
        store
            .insert_many("c", batch(&[1, 2], vec![vec![1.0, 0.0], vec![0.6, 0.8]]), 50)
            .await
            .unwrap();

        let hits = store.search_by_vector("c", &[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
        assert_eq!(hits[0].text, "text 1");
    }

    #[tokio::test]
    async fn test_upsert_by_record_id() {
        let store = MemoryVectorStore::new(DistanceMetric::Dot);
        store.create_collection("c", 2, false).await.unwrap();
        store.insert_many("c", batch(&[1], vec![vec![1.0, 0.0]]), 1).await.unwrap();
        store.insert_many("c", batch(&[1], vec![vec![0.0, 1.0]]), 1).await.unwrap();
        assert_eq!(store.collection_info("c").await.unwrap().points_count, 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_writes_nothing() {
        let store = MemoryVectorStore::new(DistanceMetric::Cosine);
        store.create_collection("c", 2, false).await.unwrap();
        let err = store
            .insert_many("c", batch(&[1, 2], vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]]), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 3, .. }));
        assert_eq!(store.collection_info("c").await.unwrap().points_count, 0);
    }

    #[tokio::test]
    async fn test_missing_collection() {
        let store = MemoryVectorStore::new(DistanceMetric::Cosine);
        assert!(matches!(
            store.search_by_vector("nope", &[1.0], 1).await,
            Err(Error::CollectionNotFound(_))
        ));
        assert!(!store.delete_collection("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_changes_dimension() {
        let store = MemoryVectorStore::new(DistanceMetric::Cosine);
        assert!(store.create_collection("c", 2, false).await.unwrap());
        assert!(!store.create_collection("c", 4, false).await.unwrap());
        assert_eq!(store.collection_info("c").await.unwrap().dimension, Some(2));
        assert!(store.create_collection("c", 4, true).await.unwrap());
        assert_eq!(store.collection_info("c").await.unwrap().dimension, Some(4));
    }

    #[tokio::test]
    async fn test_euclidean_prefers_nearest() {
        let store = MemoryVectorStore::new(DistanceMetric::Euclidean);
        store.create_collection("c", 2, false).await.unwrap();
        store
            .insert_many("c", batch(&[1, 2], vec![vec![5.0, 5.0], vec![1.0, 1.0]]), 10)
            .await
            .unwrap();
        let hits = store.search_by_vector("c", &[0.0, 0.0], 2).await.unwrap();
        assert_eq!(hits[0].text, "text 2");
    }

    #[tokio::test]
    async fn test_snapshot_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.json");

        let mut store = MemoryVectorStore::new(DistanceMetric::Cosine).with_data_file(&path);
        store.connect().await.unwrap();
        store.create_collection("c", 2, false).await.unwrap();
        store.insert_many("c", batch(&[9], vec![vec![1.0, 1.0]]), 10).await.unwrap();

        let mut reopened = MemoryVectorStore::new(DistanceMetric::Cosine).with_data_file(&path);
        reopened.connect().await.unwrap();
        assert_eq!(reopened.list_collections().await.unwrap(), vec!["c".to_string()]);
        assert_eq!(reopened.collection_info("c").await.unwrap().points_count, 1);
    }

    #[tokio::test]
    async fn test_failed_snapshot_write_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        fs::create_dir(&data_dir).unwrap();

        let store = MemoryVectorStore::new(DistanceMetric::Cosine).with_data_file(data_dir.join("vectors.json"));
        store.create_collection("c", 2, false).await.unwrap();
        store.insert_many("c", batch(&[1], vec![vec![1.0, 0.0]]), 10).await.unwrap();

        fs::remove_dir_all(&data_dir).unwrap();
        let err = store
            .insert_many("c", batch(&[1, 2], vec![vec![0.0, 1.0], vec![0.0, 1.0]]), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));

        assert_eq!(store.collection_info("c").await.unwrap().points_count, 1);
        let hits = store.search_by_vector("c", &[1.0, 0.0], 1).await.unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }
}
