//! Vector store backends and the factory selecting one

mod memory;
mod pgvector;
mod qdrant;

pub use memory::MemoryVectorStore;
pub use pgvector::{PgVectorStore, index_name, validate_identifier};
pub use qdrant::QdrantVectorStore;

use std::path::PathBuf;

use minirag_core::{Error, Result, Settings, VectorStore, VectorStoreBackend};

const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
const MEMORY_SNAPSHOT_FILE: &str = "vectors.json";

/// Builds the configured vector store. The caller connects it.
pub struct VectorStoreFactory {
    settings: Settings,
    data_dir: Option<PathBuf>,
}

impl VectorStoreFactory {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            data_dir: None,
        }
    }

    /// Directory where the memory backend keeps its snapshot
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    pub fn create(&self, backend: &str) -> Result<Box<dyn VectorStore>> {
        let backend = VectorStoreBackend::parse(backend).ok_or_else(|| {
            Error::Configuration(format!("unknown vector store backend: {}", backend))
        })?;
        let distance = self.settings.vector_db_distance_metric;

        let store: Box<dyn VectorStore> = match backend {
            VectorStoreBackend::Memory => {
                let store = MemoryVectorStore::new(distance);
                match &self.data_dir {
                    Some(dir) => Box::new(store.with_data_file(dir.join(MEMORY_SNAPSHOT_FILE))),
                    None => Box::new(store),
                }
            }
            VectorStoreBackend::Qdrant => Box::new(QdrantVectorStore::new(
                self.settings
                    .vector_db_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_QDRANT_URL.to_string()),
                distance,
            )),
            VectorStoreBackend::PgVector => {
                let url = self.settings.postgres_url.clone().ok_or_else(|| {
                    Error::Configuration("POSTGRES_URL is required for pgvector".to_string())
                })?;
                Box::new(PgVectorStore::new(
                    url,
                    distance,
                    self.settings.vector_db_pgvec_index_threshold,
                ))
            }
        };
        tracing::debug!(backend = ?store.backend(), %distance, "vector store created");
        Ok(store)
    }
}
