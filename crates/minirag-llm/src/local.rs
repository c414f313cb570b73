//! Offline hashed bag-of-words embedder
//!
//! Useful for demos and tests where no model server is reachable. Vectors
//! carry lexical overlap only, no semantics.

use async_trait::async_trait;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use minirag_core::{
    EmbedPurpose, EmbeddingModel, EmbeddingProvider, Error, LlmBackend, ProviderDefaults, Result,
};

use crate::http::{finish_embeddings, prepare_inputs};

pub const DEFAULT_LOCAL_DIMENSION: usize = 384;
const DEFAULT_LOCAL_MODEL: &str = "local-hash";

fn hash_token(token: &str) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    token.hash(&mut hasher);
    hasher.finish()
}

/// Hash words and bigrams of `text` into a unit vector of length `dimension`.
pub fn hash_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let normalized: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let words: Vec<&str> = normalized.split_whitespace().collect();
    let mut embedding = vec![0.0f32; dimension];

    for (pos, word) in words.iter().enumerate() {
        let hash = hash_token(word);
        let weight = 1.0 / (1.0 + pos as f32 * 0.1);
        embedding[(hash as usize) % dimension] += weight;

        if word.chars().count() > 3 {
            embedding[((hash >> 32) as usize) % dimension] += weight * 0.5;
        }
    }

    for pair in words.windows(2) {
        let hash = hash_token(&format!("{} {}", pair[0], pair[1]));
        embedding[(hash as usize) % dimension] += 0.3;
    }

    let norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut embedding {
            *value /= norm;
        }
    }
    embedding
}

/// Embedding-only provider that never leaves the process
pub struct LocalEmbeddingProvider {
    defaults: ProviderDefaults,
    embedding: EmbeddingModel,
}

impl LocalEmbeddingProvider {
    pub fn new(defaults: ProviderDefaults) -> Self {
        Self {
            defaults,
            embedding: EmbeddingModel::new(DEFAULT_LOCAL_MODEL, Some(DEFAULT_LOCAL_DIMENSION)),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    fn backend(&self) -> LlmBackend {
        LlmBackend::Local
    }

    fn set_embedding_model(&mut self, model_id: &str, dimension: Option<usize>) {
        let dimension = dimension.unwrap_or(DEFAULT_LOCAL_DIMENSION);
        self.embedding = EmbeddingModel::new(model_id, Some(dimension));
    }

    fn embedding_dimension(&self) -> Option<usize> {
        self.embedding.dimension()
    }

    async fn embed_texts(&self, texts: &[String], _purpose: EmbedPurpose) -> Result<Vec<Vec<f32>>> {
        let dimension = self
            .embedding
            .dimension()
            .filter(|d| *d > 0)
            .ok_or_else(|| Error::Configuration("local embedding size must be positive".to_string()))?;

        let vectors = prepare_inputs(texts, self.defaults.input_max_characters)
            .iter()
            .map(|text| hash_embedding(text, dimension))
            .collect();

        finish_embeddings(&self.embedding, LlmBackend::Local, texts.len(), vectors)
    }
}
