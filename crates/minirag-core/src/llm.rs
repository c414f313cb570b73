//! Embedding and generation provider traits and types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::{Error, Result};

/// Supported model backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    OpenAI,
    Gemini,
    Ollama,
    HuggingFace,
    /// Offline hashed bag-of-words embedder; embedding only.
    Local,
}

impl LlmBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmBackend::OpenAI => "openai",
            LlmBackend::Gemini => "gemini",
            LlmBackend::Ollama => "ollama",
            LlmBackend::HuggingFace => "huggingface",
            LlmBackend::Local => "local",
        }
    }

    /// Parse from a configuration string
    pub fn parse(s: &str) -> Option<LlmBackend> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Some(LlmBackend::OpenAI),
            "gemini" | "google" => Some(LlmBackend::Gemini),
            "ollama" => Some(LlmBackend::Ollama),
            "huggingface" | "hugging_face" | "hf" => Some(LlmBackend::HuggingFace),
            "local" | "hash" => Some(LlmBackend::Local),
            _ => None,
        }
    }
}

impl std::fmt::Display for LlmBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a text is being embedded: stored for retrieval, or used as a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedPurpose {
    Document,
    Query,
}

impl EmbedPurpose {
    /// Backend-native task type for this purpose, or `None` when the backend
    /// has no notion of one.
    ///
    /// | backend     | Document             | Query             |
    /// |-------------|----------------------|-------------------|
    /// | gemini      | `retrieval_document` | `retrieval_query` |
    /// | ollama      | `search_document`    | `search_query`    |
    /// | openai      | -                    | -                 |
    /// | huggingface | -                    | -                 |
    /// | local       | -                    | -                 |
    pub fn task_type(&self, backend: LlmBackend) -> Option<&'static str> {
        match (backend, self) {
            (LlmBackend::Gemini, EmbedPurpose::Document) => Some("retrieval_document"),
            (LlmBackend::Gemini, EmbedPurpose::Query) => Some("retrieval_query"),
            (LlmBackend::Ollama, EmbedPurpose::Document) => Some("search_document"),
            (LlmBackend::Ollama, EmbedPurpose::Query) => Some("search_query"),
            _ => None,
        }
    }
}

/// Logical speaker of a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat turn in the backend's own role vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Per-call overrides for text generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Limits shared by every backend, taken from settings at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProviderDefaults {
    pub input_max_characters: usize,
    pub output_max_tokens: u32,
    pub temperature: f32,
}

impl Default for ProviderDefaults {
    fn default() -> Self {
        Self {
            input_max_characters: 1000,
            output_max_tokens: 1000,
            temperature: 0.1,
        }
    }
}

/// Cut `text` to at most `max_chars` characters, then trim surrounding whitespace.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// Embedding model identity plus its dimension.
///
/// The dimension is either configured up front or recorded from the first
/// successful embedding call. First call wins; later calls never change it.
#[derive(Debug, Default)]
pub struct EmbeddingModel {
    model_id: Option<String>,
    configured: Option<usize>,
    dimension: OnceLock<usize>,
}

impl EmbeddingModel {
    pub fn new(model_id: impl Into<String>, dimension: Option<usize>) -> Self {
        let model = Self {
            model_id: Some(model_id.into()),
            configured: dimension,
            dimension: OnceLock::new(),
        };
        if let Some(dim) = dimension {
            let _ = model.dimension.set(dim);
        }
        model
    }

    pub fn model_id(&self) -> Result<&str> {
        self.model_id
            .as_deref()
            .ok_or_else(|| Error::Configuration("embedding model is not set".to_string()))
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension.get().copied()
    }

    /// Dimension set at configuration time, never an observed one.
    /// Only this value is sent to backends as a requested output size.
    pub fn configured_dimension(&self) -> Option<usize> {
        self.configured
    }

    /// Record the length of a returned vector. Returns `true` when this call
    /// was the one that fixed the dimension.
    pub fn observe(&self, len: usize) -> bool {
        self.dimension.set(len).is_ok()
    }
}

/// Trait for "text to vector" backends.
///
/// Configuration happens once at startup through `&mut self`; afterwards the
/// provider is shared read-only and only the auto-detected dimension may be
/// filled in.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Backend this provider talks to
    fn backend(&self) -> LlmBackend;

    /// Set the embedding model. `dimension` may be unknown.
    fn set_embedding_model(&mut self, model_id: &str, dimension: Option<usize>);

    /// Configured or auto-detected vector length
    fn embedding_dimension(&self) -> Option<usize>;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_texts(&self, texts: &[String], purpose: EmbedPurpose) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text
    async fn embed_text(&self, text: &str, purpose: EmbedPurpose) -> Result<Vec<f32>> {
        let mut vectors = self.embed_texts(&[text.to_string()], purpose).await?;
        match vectors.pop() {
            Some(vector) if !vector.is_empty() => Ok(vector),
            _ => Err(Error::EmptyResponse(format!(
                "{} returned no embedding",
                self.backend()
            ))),
        }
    }
}

/// Trait for text generation backends
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Backend this provider talks to
    fn backend(&self) -> LlmBackend;

    /// Set the generation model
    fn set_generation_model(&mut self, model_id: &str);

    /// Generate a reply to `prompt`, sent as a user turn after `chat_history`.
    async fn generate_text(
        &self,
        prompt: &str,
        chat_history: &[ChatMessage],
        options: GenerationOptions,
    ) -> Result<String>;

    /// Build one chat turn in this backend's role vocabulary
    fn construct_prompt(&self, text: &str, role: Role) -> ChatMessage;

    /// Truncate text to the backend's input limit
    fn process_text(&self, text: &str) -> String;
}
