//! Process-wide wiring of providers and stores

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use minirag_core::{ChunkStore, EmbeddingProvider, GenerationOptions, Settings, VectorStore};
use minirag_llm::ProviderFactory;
use minirag_rag::{
    BatchIndexer, InMemoryChunkStore, RagEngine, TemplateParser, VectorStoreFactory,
};

const CHUNKS_FILE: &str = "chunks.json";

/// Everything a command needs, built once at startup.
///
/// Providers are configured while still owned, then frozen behind `Arc`.
pub struct AppContext {
    pub settings: Settings,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub vector_store: Arc<dyn VectorStore>,
    pub chunk_store: Arc<dyn ChunkStore>,
}

impl AppContext {
    pub async fn build(settings: Settings, data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

        let mut embedder = ProviderFactory::new(settings.clone())
            .create_embedding(&settings.embedding_backend)?;
        if let Some(model_id) = &settings.embedding_model_id {
            embedder.set_embedding_model(model_id, settings.embedding_size);
        }

        let mut vector_store = VectorStoreFactory::new(settings.clone())
            .with_data_dir(data_dir)
            .create(&settings.vector_db_backend)?;
        vector_store.connect().await?;

        let chunk_store = InMemoryChunkStore::open(data_dir.join(CHUNKS_FILE))?;

        tracing::info!(
            embedding = %embedder.backend(),
            vector_store = ?vector_store.backend(),
            data_dir = %data_dir.display(),
            "context ready"
        );

        Ok(Self {
            settings,
            embedder: Arc::from(embedder),
            vector_store: Arc::from(vector_store),
            chunk_store: Arc::new(chunk_store),
        })
    }

    pub fn indexer(&self) -> BatchIndexer {
        BatchIndexer::new(
            self.embedder.clone(),
            self.vector_store.clone(),
            self.chunk_store.clone(),
        )
        .with_page_size(self.settings.indexing_page_size)
        .with_insert_batch_size(self.settings.vector_db_insert_batch_size)
    }

    /// Answering engine. The generation backend is only built here, so
    /// commands that never generate do not need its credentials.
    pub fn rag_engine(&self) -> Result<RagEngine> {
        let mut generator = ProviderFactory::new(self.settings.clone())
            .create_generation(&self.settings.generation_backend)?;
        if let Some(model_id) = &self.settings.generation_model_id {
            generator.set_generation_model(model_id);
        }

        let templates = TemplateParser::new(
            &self.settings.primary_language,
            &self.settings.default_language,
        );
        Ok(RagEngine::new(
            self.embedder.clone(),
            Arc::from(generator),
            self.vector_store.clone(),
            templates,
        )
        .with_options(GenerationOptions {
            max_tokens: Some(self.settings.generation_default_max_tokens),
            temperature: Some(self.settings.generation_default_temperature),
        }))
    }

    /// Release backend connections
    pub async fn shutdown(mut self) -> Result<()> {
        match Arc::get_mut(&mut self.vector_store) {
            Some(store) => store.disconnect().await?,
            None => tracing::warn!("vector store still shared at shutdown, leaving it open"),
        }
        Ok(())
    }
}

pub fn default_data_dir() -> PathBuf {
    PathBuf::from(".minirag")
}
