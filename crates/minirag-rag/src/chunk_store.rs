//! In-memory chunk store, optionally snapshotted to a JSON file

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use minirag_core::{Chunk, ChunkStore, Error, Result, StoredChunk};

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChunkStoreData {
    next_id: i64,
    chunks: Vec<StoredChunk>,
}

/// Chunk store keeping every record in memory.
///
/// Ids are assigned from an increasing counter, so insertion order is id
/// order and pages come back sorted without extra work.
pub struct InMemoryChunkStore {
    data: RwLock<ChunkStoreData>,
    data_file: Option<PathBuf>,
}

impl Default for InMemoryChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(ChunkStoreData {
                next_id: 1,
                chunks: Vec::new(),
            }),
            data_file: None,
        }
    }

    /// Open a store backed by `data_file`, loading it if it exists.
    /// Every write rewrites the file.
    pub fn open(data_file: impl AsRef<Path>) -> Result<Self> {
        let path = data_file.as_ref().to_path_buf();
        let data = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            ChunkStoreData {
                next_id: 1,
                chunks: Vec::new(),
            }
        };
        tracing::debug!(path = %path.display(), chunks = data.chunks.len(), "chunk store opened");
        Ok(Self {
            data: RwLock::new(data),
            data_file: Some(path),
        })
    }

    fn save(&self, data: &ChunkStoreData) -> Result<()> {
        if let Some(path) = &self.data_file {
            let content = serde_json::to_string_pretty(data)?;
            fs::write(path, content)?;
        }
        Ok(())
    }

    fn lock_error<E: std::fmt::Display>(e: E) -> Error {
        Error::ChunkStore(format!("Lock error: {}", e))
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn insert_many(&self, chunks: Vec<Chunk>) -> Result<usize> {
        let mut data = self.data.write().map_err(Self::lock_error)?;
        let inserted = chunks.len();
        for chunk in chunks {
            let id = data.next_id;
            data.next_id += 1;
            data.chunks.push(StoredChunk { id, chunk });
        }
        self.save(&data)?;
        Ok(inserted)
    }

    async fn get_page(&self, project_id: &str, page_no: usize, page_size: usize) -> Result<Vec<StoredChunk>> {
        if page_no == 0 || page_size == 0 {
            return Err(Error::InvalidInput(format!(
                "page_no ({}) and page_size ({}) must be at least 1",
                page_no, page_size
            )));
        }
        let data = self.data.read().map_err(Self::lock_error)?;
        Ok(data
            .chunks
            .iter()
            .filter(|c| c.chunk.project_id == project_id)
            .skip((page_no - 1) * page_size)
            .take(page_size)
            .cloned()
            .collect())
    }

    async fn count(&self, project_id: &str) -> Result<usize> {
        let data = self.data.read().map_err(Self::lock_error)?;
        Ok(data
            .chunks
            .iter()
            .filter(|c| c.chunk.project_id == project_id)
            .count())
    }

    async fn delete_all(&self, project_id: &str) -> Result<usize> {
        let mut data = self.data.write().map_err(Self::lock_error)?;
        let before = data.chunks.len();
        data.chunks.retain(|c| c.chunk.project_id != project_id);
        let removed = before - data.chunks.len();
        self.save(&data)?;
        Ok(removed)
    }
}
