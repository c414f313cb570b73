//! Chunk persistence trait

use async_trait::async_trait;

use crate::{Chunk, Result, StoredChunk};

/// Trait for the store that persists chunk records per project.
///
/// Pages are ordered by chunk id, so a full pass over `get_page(1..)` visits
/// each chunk once as long as nobody writes concurrently.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Persist chunks, returning how many were written
    async fn insert_many(&self, chunks: Vec<Chunk>) -> Result<usize>;

    /// Fetch one 1-based page of a project's chunks
    async fn get_page(&self, project_id: &str, page_no: usize, page_size: usize) -> Result<Vec<StoredChunk>>;

    /// Count a project's chunks
    async fn count(&self, project_id: &str) -> Result<usize>;

    /// Delete every chunk of a project, returning how many were removed
    async fn delete_all(&self, project_id: &str) -> Result<usize>;
}
