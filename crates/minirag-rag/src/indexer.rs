//! Paginated batch indexing: chunk pages → embeddings → vector store

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use minirag_core::{
    ChunkStore, EmbedPurpose, EmbeddingProvider, Error, InsertBatch, StoredChunk, VectorStore,
    collection_name,
};

const DEFAULT_PAGE_SIZE: usize = 50;
const DEFAULT_INSERT_BATCH_SIZE: usize = 50;

/// What to clear before an indexing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetPolicy {
    /// Index on top of whatever the collection holds
    #[default]
    None,
    /// Drop and recreate the vector collection, keep chunk rows
    Collection,
    /// Drop the vector collection and delete every chunk row of the project.
    /// The two deletions are not transactional.
    Project,
}

/// Where an indexing run is, or where it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingState {
    Start,
    Reset,
    PageFetch,
    PageEmbedAndUpsert,
    Done,
    Aborted,
}

/// Outcome of a finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexingReport {
    pub state: IndexingState,
    pub pages_fetched: usize,
    pub inserted_count: usize,
    pub total_expected: usize,
}

/// A run stopped on its first failure. Pages before `page_no` are committed.
#[derive(Debug, thiserror::Error)]
#[error("indexing of project {project_id} aborted in {state:?} at page {page_no} after {inserted} inserted: {source}")]
pub struct IndexingAborted {
    pub project_id: String,
    pub state: IndexingState,
    pub page_no: usize,
    pub inserted: usize,
    #[source]
    pub source: Error,
}

/// Tracks progress so any failure can be reported with its position.
struct Run<'a> {
    project_id: &'a str,
    state: IndexingState,
    page_no: usize,
    pages_fetched: usize,
    inserted: usize,
}

impl Run<'_> {
    fn abort(&self, source: Error) -> IndexingAborted {
        tracing::error!(
            project_id = self.project_id,
            state = ?self.state,
            page_no = self.page_no,
            inserted = self.inserted,
            "indexing aborted: {}",
            source
        );
        IndexingAborted {
            project_id: self.project_id.to_string(),
            state: self.state,
            page_no: self.page_no,
            inserted: self.inserted,
            source,
        }
    }
}

/// Drives one project's chunks through the embedder into its collection.
pub struct BatchIndexer {
    embedder: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    chunk_store: Arc<dyn ChunkStore>,
    page_size: usize,
    insert_batch_size: usize,
}

impl BatchIndexer {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
        chunk_store: Arc<dyn ChunkStore>,
    ) -> Self {
        Self {
            embedder,
            vector_store,
            chunk_store,
            page_size: DEFAULT_PAGE_SIZE,
            insert_batch_size: DEFAULT_INSERT_BATCH_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_insert_batch_size(mut self, batch_size: usize) -> Self {
        self.insert_batch_size = batch_size.max(1);
        self
    }

    /// Index every persisted chunk of `project_id`.
    ///
    /// Pages are fetched until an empty one comes back, or one shorter than
    /// the page size. Each page is embedded with one call and upserted with
    /// one `insert_many`; the first failure aborts the run.
    pub async fn index_project(
        &self,
        project_id: &str,
        reset: ResetPolicy,
    ) -> std::result::Result<IndexingReport, IndexingAborted> {
        let collection = collection_name(project_id);
        let mut run = Run {
            project_id,
            state: IndexingState::Start,
            page_no: 0,
            pages_fetched: 0,
            inserted: 0,
        };

        if reset != ResetPolicy::None {
            run.state = IndexingState::Reset;
            self.reset(project_id, &collection, reset)
                .await
                .map_err(|e| run.abort(e))?;
        }

        let total_expected = self
            .chunk_store
            .count(project_id)
            .await
            .map_err(|e| run.abort(e))?;
        tracing::info!(project_id, collection = %collection, total_expected, "indexing started");

        let mut collection_ready = false;
        if let Some(dimension) = self.embedder.embedding_dimension() {
            self.ensure_collection(&collection, dimension)
                .await
                .map_err(|e| run.abort(e))?;
            collection_ready = true;
        }

        loop {
            run.page_no += 1;
            run.state = IndexingState::PageFetch;
            let page = self
                .chunk_store
                .get_page(project_id, run.page_no, self.page_size)
                .await
                .map_err(|e| run.abort(e))?;
            if page.is_empty() {
                break;
            }
            run.pages_fetched += 1;

            run.state = IndexingState::PageEmbedAndUpsert;
            let count = page.len();
            let batch = self.embed_page(page).await.map_err(|e| run.abort(e))?;

            if !collection_ready {
                let dimension = batch.vectors.first().map(Vec::len).unwrap_or(0);
                self.ensure_collection(&collection, dimension)
                    .await
                    .map_err(|e| run.abort(e))?;
                collection_ready = true;
            }

            self.vector_store
                .insert_many(&collection, batch, self.insert_batch_size)
                .await
                .map_err(|e| run.abort(e))?;
            run.inserted += count;

            tracing::info!(
                project_id,
                page_no = run.page_no,
                inserted = run.inserted,
                total_expected,
                "page indexed"
            );

            if count < self.page_size {
                break;
            }
        }

        tracing::info!(project_id, inserted = run.inserted, pages = run.pages_fetched, "indexing done");
        Ok(IndexingReport {
            state: IndexingState::Done,
            pages_fetched: run.pages_fetched,
            inserted_count: run.inserted,
            total_expected,
        })
    }

    async fn reset(&self, project_id: &str, collection: &str, reset: ResetPolicy) -> minirag_core::Result<()> {
        self.vector_store.delete_collection(collection).await?;
        if reset == ResetPolicy::Project {
            let removed = self.chunk_store.delete_all(project_id).await?;
            tracing::info!(project_id, removed, "project chunks deleted");
        }
        Ok(())
    }

    async fn ensure_collection(&self, collection: &str, dimension: usize) -> minirag_core::Result<()> {
        if self
            .vector_store
            .create_collection(collection, dimension, false)
            .await?
        {
            tracing::info!(collection, dimension, "collection created for indexing");
        }
        Ok(())
    }

    async fn embed_page(&self, page: Vec<StoredChunk>) -> minirag_core::Result<InsertBatch> {
        let texts: Vec<String> = page.iter().map(|c| c.chunk.text.clone()).collect();
        let vectors = self
            .embedder
            .embed_texts(&texts, EmbedPurpose::Document)
            .await?;
        if vectors.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        let (record_ids, metadatas) = page
            .into_iter()
            .map(|c| (c.id, Some(c.chunk.metadata)))
            .unzip();

        Ok(InsertBatch {
            texts,
            vectors,
            metadatas,
            record_ids,
        })
    }
}
