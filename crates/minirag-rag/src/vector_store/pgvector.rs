//! PostgreSQL + pgvector store
//!
//! One table per collection:
//!
//! ```sql
//! CREATE TABLE "collection_42" (
//!     id BIGSERIAL PRIMARY KEY,
//!     text TEXT,
//!     embedding VECTOR(768),
//!     metadata JSONB DEFAULT '{}',
//!     chunk_id BIGINT NOT NULL UNIQUE
//! );
//! ```
//!
//! Scans are exact until a collection reaches `index_threshold` rows, at which
//! point an HNSW index is built after the insert that crossed it.

use async_trait::async_trait;
use regex::Regex;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::sync::LazyLock;

use minirag_core::{
    COLLECTION_PREFIX, CollectionInfo, DistanceMetric, Error, InsertBatch, Result,
    RetrievedDocument, VectorStore, VectorStoreBackend,
};

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_]+$").expect("identifier pattern is valid")
});

const MAX_CONNECTIONS: u32 = 5;

/// Reject names that cannot be used verbatim as SQL identifiers
pub fn validate_identifier(name: &str) -> Result<&str> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(Error::InvalidInput(format!(
            "collection name {:?} must match [A-Za-z0-9_]+",
            name
        )))
    }
}

pub fn index_name(collection: &str) -> String {
    format!("{}_vector_idx", collection)
}

/// Operator class used for the HNSW index
fn index_ops(distance: DistanceMetric) -> &'static str {
    match distance {
        DistanceMetric::Cosine => "vector_cosine_ops",
        DistanceMetric::Dot => "vector_ip_ops",
        DistanceMetric::Euclidean => "vector_l2_ops",
    }
}

/// Distance operator and the expression turning it into a "higher is better" score
fn score_sql(distance: DistanceMetric) -> (&'static str, &'static str) {
    match distance {
        DistanceMetric::Cosine => ("<=>", "1 - (embedding <=> $1::vector)"),
        DistanceMetric::Dot => ("<#>", "-(embedding <#> $1::vector)"),
        DistanceMetric::Euclidean => ("<->", "-(embedding <-> $1::vector)"),
    }
}

fn create_table_sql(collection: &str, dimension: usize) -> String {
    format!(
        "CREATE TABLE \"{}\" (\
         id BIGSERIAL PRIMARY KEY, \
         text TEXT, \
         embedding VECTOR({}), \
         metadata JSONB DEFAULT '{{}}', \
         chunk_id BIGINT NOT NULL UNIQUE)",
        collection, dimension
    )
}

fn upsert_sql(collection: &str) -> String {
    format!(
        "INSERT INTO \"{}\" (text, embedding, metadata, chunk_id) \
         VALUES ($1, $2::vector, $3, $4) \
         ON CONFLICT (chunk_id) DO UPDATE SET \
         text = EXCLUDED.text, embedding = EXCLUDED.embedding, metadata = EXCLUDED.metadata",
        collection
    )
}

fn search_sql(collection: &str, distance: DistanceMetric) -> String {
    let (operator, score) = score_sql(distance);
    format!(
        "SELECT text, ({})::real AS score FROM \"{}\" \
         ORDER BY embedding {} $1::vector LIMIT $2",
        score, collection, operator
    )
}

fn create_index_sql(collection: &str, distance: DistanceMetric) -> String {
    format!(
        "CREATE INDEX \"{}\" ON \"{}\" USING hnsw (embedding {})",
        index_name(collection),
        collection,
        index_ops(distance)
    )
}

/// Quoted relation name for `::regclass` lookups; unquoted names are case-folded.
fn regclass_literal(collection: &str) -> String {
    format!("\"{}\"", collection.replace('"', "\"\""))
}

/// What `create_vector_index` does for a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexAction {
    Keep,
    BelowThreshold,
    Create,
}

fn index_action(index_exists: bool, rows: u64, threshold: u64) -> IndexAction {
    if index_exists {
        IndexAction::Keep
    } else if rows < threshold {
        IndexAction::BelowThreshold
    } else {
        IndexAction::Create
    }
}

/// pgvector text literal, e.g. `[0.1,0.2]`
fn vector_literal(vector: &[f32]) -> String {
    let values: Vec<String> = vector.iter().map(|v| v.to_string()).collect();
    format!("[{}]", values.join(","))
}

fn db_error(e: sqlx::Error) -> Error {
    Error::VectorStore(format!("PostgreSQL error: {}", e))
}

/// pgvector-backed store
pub struct PgVectorStore {
    url: String,
    distance: DistanceMetric,
    index_threshold: u64,
    pool: Option<PgPool>,
}

impl PgVectorStore {
    pub fn new(url: impl Into<String>, distance: DistanceMetric, index_threshold: u64) -> Self {
        Self {
            url: url.into(),
            distance,
            index_threshold,
            pool: None,
        }
    }

    fn pool(&self) -> Result<&PgPool> {
        self.pool
            .as_ref()
            .ok_or_else(|| Error::VectorStore("pgvector store is not connected".to_string()))
    }

    async fn ensure_exists(&self, collection: &str) -> Result<()> {
        if self.collection_exists(collection).await? {
            Ok(())
        } else {
            tracing::error!(collection, "collection does not exist");
            Err(Error::CollectionNotFound(collection.to_string()))
        }
    }

    async fn dimension(&self, collection: &str) -> Result<Option<usize>> {
        let typmod: Option<i32> = sqlx::query_scalar(
            "SELECT atttypmod FROM pg_attribute \
             WHERE attrelid = $1::regclass AND attname = 'embedding'",
        )
        .bind(regclass_literal(collection))
        .fetch_optional(self.pool()?)
        .await
        .map_err(db_error)?;
        Ok(typmod.filter(|d| *d > 0).map(|d| d as usize))
    }

    async fn row_count(&self, collection: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{}\"", collection))
            .fetch_one(self.pool()?)
            .await
            .map_err(db_error)?;
        Ok(count.max(0) as u64)
    }

    /// Check whether the collection's ANN index exists
    pub async fn index_exists(&self, collection: &str) -> Result<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM pg_indexes WHERE tablename = $1 AND indexname = $2)",
        )
        .bind(collection)
        .bind(index_name(collection))
        .fetch_one(self.pool()?)
        .await
        .map_err(db_error)
    }

    /// Build the HNSW index once the collection has enough rows.
    /// Returns `true` if an index was created.
    pub async fn create_vector_index(&self, collection: &str) -> Result<bool> {
        let collection = validate_identifier(collection)?;
        let exists = self.index_exists(collection).await?;
        let rows = if exists { 0 } else { self.row_count(collection).await? };
        match index_action(exists, rows, self.index_threshold) {
            IndexAction::Keep => return Ok(false),
            IndexAction::BelowThreshold => {
                tracing::debug!(collection, rows, threshold = self.index_threshold, "below index threshold");
                return Ok(false);
            }
            IndexAction::Create => {}
        }

        tracing::info!(collection, rows, "creating hnsw index");
        sqlx::query(&create_index_sql(collection, self.distance))
            .execute(self.pool()?)
            .await
            .map_err(db_error)?;
        tracing::info!(collection, "hnsw index created");
        Ok(true)
    }

    /// Drop the ANN index if present and rebuild it if the threshold is met
    pub async fn reset_vector_index(&self, collection: &str) -> Result<bool> {
        let collection = validate_identifier(collection)?;
        sqlx::query(&format!("DROP INDEX IF EXISTS \"{}\"", index_name(collection)))
            .execute(self.pool()?)
            .await
            .map_err(db_error)?;
        tracing::info!(collection, "vector index dropped");
        self.create_vector_index(collection).await
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    fn backend(&self) -> VectorStoreBackend {
        VectorStoreBackend::PgVector
    }

    async fn connect(&mut self) -> Result<()> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(&self.url)
            .await
            .map_err(|e| Error::Network(format!("PostgreSQL connection failed: {}", e)))?;

        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&pool)
            .await
            .map_err(db_error)?;

        self.pool = Some(pool);
        tracing::info!("connected to PostgreSQL, vector extension available");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            tracing::info!("disconnected from PostgreSQL");
        }
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_tables WHERE tablename = $1)")
            .bind(name)
            .fetch_one(self.pool()?)
            .await
            .map_err(db_error)
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT tablename::text FROM pg_tables WHERE tablename LIKE $1 ORDER BY tablename")
            .bind(format!("{}%", COLLECTION_PREFIX))
            .fetch_all(self.pool()?)
            .await
            .map_err(db_error)
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
        let name = validate_identifier(name)?;
        self.ensure_exists(name).await?;
        Ok(CollectionInfo {
            name: name.to_string(),
            dimension: self.dimension(name).await?,
            distance: self.distance,
            points_count: self.row_count(name).await?,
            indexed: self.index_exists(name).await?,
        })
    }

    async fn create_collection(&self, name: &str, dimension: usize, reset: bool) -> Result<bool> {
        let name = validate_identifier(name)?;
        if reset {
            self.delete_collection(name).await?;
        }
        if self.collection_exists(name).await? {
            return Ok(false);
        }

        tracing::info!(collection = name, dimension, "creating collection");
        sqlx::query(&create_table_sql(name, dimension))
            .execute(self.pool()?)
            .await
            .map_err(db_error)?;
        Ok(true)
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        let name = validate_identifier(name)?;
        if !self.collection_exists(name).await? {
            tracing::warn!(collection = name, "collection does not exist, nothing to delete");
            return Ok(false);
        }
        sqlx::query(&format!("DROP TABLE IF EXISTS \"{}\"", name))
            .execute(self.pool()?)
            .await
            .map_err(db_error)?;
        Ok(true)
    }

    async fn insert_many(&self, collection: &str, batch: InsertBatch, batch_size: usize) -> Result<()> {
        let collection = validate_identifier(collection)?;
        let batch = batch.validate(collection)?;
        self.ensure_exists(collection).await?;
        if let Some(dimension) = self.dimension(collection).await? {
            batch.check_dimension(collection, dimension)?;
        }

        let sql = upsert_sql(collection);
        let batch_size = batch_size.max(1);
        let total = batch.len();

        // Whole call in one transaction: either every batch lands or none does.
        let mut tx = self.pool()?.begin().await.map_err(db_error)?;
        for start in (0..total).step_by(batch_size) {
            let end = (start + batch_size).min(total);
            for i in start..end {
                let metadata = batch.metadatas[i]
                    .as_ref()
                    .map(|m| serde_json::to_value(m))
                    .transpose()?;
                sqlx::query(&sql)
                    .bind(&batch.texts[i])
                    .bind(vector_literal(&batch.vectors[i]))
                    .bind(metadata)
                    .bind(batch.record_ids[i])
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| {
                        tracing::error!(collection, batch_start = start, "batch insert failed: {}", e);
                        db_error(e)
                    })?;
            }
        }
        tx.commit().await.map_err(db_error)?;
        tracing::debug!(collection, total, "points upserted");

        self.create_vector_index(collection).await?;
        Ok(())
    }

    async fn search_by_vector(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedDocument>> {
        let collection = validate_identifier(collection)?;
        self.ensure_exists(collection).await?;

        let rows = sqlx::query(&search_sql(collection, self.distance))
            .bind(vector_literal(vector))
            .bind(top_k as i64)
            .fetch_all(self.pool()?)
            .await
            .map_err(db_error)?;

        rows.into_iter()
            .map(|row| {
                Ok(RetrievedDocument {
                    text: row.try_get::<Option<String>, _>("text").map_err(db_error)?.unwrap_or_default(),
                    score: row.try_get::<f32, _>("score").map_err(db_error)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_validation() {
        assert!(validate_identifier("collection_42").is_ok());
        assert!(validate_identifier("collection_1; DROP TABLE chunks").is_err());
        assert!(validate_identifier("collection-1").is_err());
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn test_vector_literal() {
        assert_eq!(vector_literal(&[0.5, -1.0, 2.25]), "[0.5,-1,2.25]");
    }

    #[test]
    fn test_index_ops_follow_metric() {
        assert_eq!(index_ops(DistanceMetric::Cosine), "vector_cosine_ops");
        assert_eq!(index_ops(DistanceMetric::Dot), "vector_ip_ops");
        assert_eq!(index_ops(DistanceMetric::Euclidean), "vector_l2_ops");
        assert_eq!(index_name("collection_1"), "collection_1_vector_idx");
    }

    #[test]
    fn test_cosine_search_sql() {
        insta::assert_snapshot!(
            search_sql("collection_7", DistanceMetric::Cosine),
            @r#"SELECT text, (1 - (embedding <=> $1::vector))::real AS score FROM "collection_7" ORDER BY embedding <=> $1::vector LIMIT $2"#
        );
    }

    #[test]
    fn test_create_table_sql() {
        insta::assert_snapshot!(
            create_table_sql("collection_7", 384),
            @r#"CREATE TABLE "collection_7" (id BIGSERIAL PRIMARY KEY, text TEXT, embedding VECTOR(384), metadata JSONB DEFAULT '{}', chunk_id BIGINT NOT NULL UNIQUE)"#
        );
    }

    #[test]
    fn test_regclass_keeps_case() {
        assert_eq!(regclass_literal("collection_ABC"), r#""collection_ABC""#);
        assert_eq!(regclass_literal("collection_42"), r#""collection_42""#);
        assert_eq!(regclass_literal(r#"a"b"#), r#""a""b""#);
    }

    #[test]
    fn test_index_created_only_at_threshold() {
        assert_eq!(index_action(false, 999, 1000), IndexAction::BelowThreshold);
        assert_eq!(index_action(false, 1000, 1000), IndexAction::Create);
        assert_eq!(index_action(false, 5000, 1000), IndexAction::Create);
        assert_eq!(index_action(true, 5000, 1000), IndexAction::Keep);
        assert_eq!(index_action(false, 0, 0), IndexAction::Create);
    }

    #[test]
    fn test_create_index_sql() {
        insta::assert_snapshot!(
            create_index_sql("collection_ABC", DistanceMetric::Dot),
            @r#"CREATE INDEX "collection_ABC_vector_idx" ON "collection_ABC" USING hnsw (embedding vector_ip_ops)"#
        );
    }

    #[test]
    fn test_upsert_sql_conflicts_on_chunk_id() {
        let sql = upsert_sql("collection_7");
        assert!(sql.starts_with("INSERT INTO \"collection_7\""));
        assert!(sql.contains("ON CONFLICT (chunk_id) DO UPDATE"));
    }

    #[tokio::test]
    async fn test_requires_connection() {
        let store = PgVectorStore::new("postgres://localhost/minirag", DistanceMetric::Cosine, 1000);
        assert!(matches!(
            store.collection_exists("collection_1").await,
            Err(Error::VectorStore(_))
        ));
    }
}
