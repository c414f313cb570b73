//! Core traits and types for minirag
//!
//! This crate defines the capability-facing interfaces of the pipeline:
//! embedding and generation providers, vector stores and chunk stores, plus
//! the shared domain types, error type and process settings.

pub mod chunk_store;
pub mod config;
pub mod error;
pub mod llm;
pub mod types;
pub mod vector_store;

pub use chunk_store::ChunkStore;
pub use config::Settings;
pub use error::{Error, ErrorKind, Result};
pub use llm::{
    ChatMessage, EmbedPurpose, EmbeddingModel, EmbeddingProvider, GenerationOptions,
    GenerationProvider, LlmBackend, ProviderDefaults, Role, truncate_text,
};
pub use types::*;
pub use vector_store::{InsertBatch, VectorStore, VectorStoreBackend};
