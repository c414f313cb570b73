//! Indexing and answering pipeline for minirag
//!
//! Documents are split by the [`chunker`], persisted in a chunk store, pushed
//! through an embedding provider into a vector store by the
//! [`BatchIndexer`], and finally answered from by the [`RagEngine`].

pub mod chunk_store;
pub mod chunker;
pub mod engine;
pub mod indexer;
pub mod templates;
pub mod vector_store;

#[cfg(test)]
mod tests;

pub use chunk_store::InMemoryChunkStore;
pub use chunker::{TextSplitter, chunk_pages, process_document};
pub use engine::{RagAnswer, RagEngine};
pub use indexer::{BatchIndexer, IndexingAborted, IndexingReport, IndexingState, ResetPolicy};
pub use templates::TemplateParser;
pub use vector_store::{
    MemoryVectorStore, PgVectorStore, QdrantVectorStore, VectorStoreFactory,
};
