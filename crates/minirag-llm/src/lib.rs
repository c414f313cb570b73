//! Model backends for minirag
//!
//! This crate provides the embedding and generation implementations of the
//! `minirag-core` provider traits, plus a factory selecting one by name.

mod factory;
mod gemini;
mod http;
mod huggingface;
mod local;
mod ollama;
mod openai;


pub use factory::ProviderFactory;
pub use gemini::GeminiProvider;
pub use huggingface::HuggingFaceProvider;
pub use local::{DEFAULT_LOCAL_DIMENSION, LocalEmbeddingProvider, hash_embedding};
pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;

// Re-export core types for convenience
pub use minirag_core::{
    ChatMessage, EmbedPurpose, EmbeddingProvider, Error, GenerationOptions, GenerationProvider,
    LlmBackend, ProviderDefaults, Result, Role,
};
