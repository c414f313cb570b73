//! Hugging Face Inference provider

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use minirag_core::{
    ChatMessage, EmbedPurpose, EmbeddingModel, EmbeddingProvider, Error, GenerationOptions,
    GenerationProvider, LlmBackend, ProviderDefaults, Result, Role, truncate_text,
};

use crate::http::{build_client, finish_embeddings, log_failure, prepare_inputs, send_json};
use crate::openai::{ChatRequest, ChatResponse, openai_role};

const DEFAULT_BASE_URL: &str = "https://router.huggingface.co";

#[derive(Serialize)]
struct FeatureExtractionRequest<'a> {
    inputs: &'a [String],
}

/// Feature-extraction output: pooled sentence vectors, or token vectors per input.
#[derive(Deserialize)]
#[serde(untagged)]
enum FeatureExtraction {
    Pooled(Vec<Vec<f32>>),
    Tokens(Vec<Vec<Vec<f32>>>),
}

impl FeatureExtraction {
    fn into_vectors(self) -> Vec<Vec<f32>> {
        match self {
            FeatureExtraction::Pooled(vectors) => vectors,
            FeatureExtraction::Tokens(inputs) => inputs.into_iter().map(mean_pool).collect(),
        }
    }
}

fn mean_pool(tokens: Vec<Vec<f32>>) -> Vec<f32> {
    let Some(width) = tokens.first().map(Vec::len) else {
        return Vec::new();
    };
    let mut pooled = vec![0.0f32; width];
    for token in &tokens {
        for (acc, value) in pooled.iter_mut().zip(token) {
            *acc += value;
        }
    }
    let count = tokens.len() as f32;
    pooled.iter_mut().for_each(|v| *v /= count);
    pooled
}

/// Hugging Face provider: feature-extraction for embeddings, the router's
/// OpenAI-compatible endpoint for chat.
pub struct HuggingFaceProvider {
    api_key: String,
    base_url: String,
    defaults: ProviderDefaults,
    generation_model_id: Option<String>,
    embedding: EmbeddingModel,
    client: Client,
}

impl HuggingFaceProvider {
    pub fn new(api_key: impl Into<String>, defaults: ProviderDefaults) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            defaults,
            generation_model_id: None,
            embedding: EmbeddingModel::default(),
            client: build_client()?,
        })
    }

    /// Point the provider at another endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn feature_extraction_url(&self, model: &str) -> String {
        format!(
            "{}/hf-inference/models/{}/pipeline/feature-extraction",
            self.base_url, model
        )
    }

    async fn request_embeddings(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self.embedding.model_id()?;
        let request = self
            .client
            .post(self.feature_extraction_url(model))
            .bearer_auth(&self.api_key)
            .json(&FeatureExtractionRequest { inputs });

        let response: FeatureExtraction =
            send_json(request, LlmBackend::HuggingFace, Error::Embedding).await?;

        finish_embeddings(
            &self.embedding,
            LlmBackend::HuggingFace,
            inputs.len(),
            response.into_vectors(),
        )
    }

    async fn request_chat(&self, messages: &[ChatMessage], options: GenerationOptions) -> Result<String> {
        let model = self.generation_model_id.as_deref().ok_or_else(|| {
            Error::Configuration("generation model for Hugging Face provider is not set".to_string())
        })?;

        let body = ChatRequest {
            model,
            messages,
            max_tokens: options.max_tokens.unwrap_or(self.defaults.output_max_tokens),
            temperature: options.temperature.unwrap_or(self.defaults.temperature),
        };

        let request = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body);

        let response: ChatResponse =
            send_json(request, LlmBackend::HuggingFace, Error::Generation).await?;

        response
            .into_text()
            .ok_or_else(|| Error::EmptyResponse("Hugging Face returned no completion text".to_string()))
    }
}

#[async_trait]
impl EmbeddingProvider for HuggingFaceProvider {
    fn backend(&self) -> LlmBackend {
        LlmBackend::HuggingFace
    }

    fn set_embedding_model(&mut self, model_id: &str, dimension: Option<usize>) {
        self.embedding = EmbeddingModel::new(model_id, dimension);
    }

    fn embedding_dimension(&self) -> Option<usize> {
        self.embedding.dimension()
    }

    async fn embed_texts(&self, texts: &[String], _purpose: EmbedPurpose) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let inputs = prepare_inputs(texts, self.defaults.input_max_characters);
        log_failure(
            LlmBackend::HuggingFace,
            "embedding",
            self.request_embeddings(&inputs).await,
        )
    }
}

#[async_trait]
impl GenerationProvider for HuggingFaceProvider {
    fn backend(&self) -> LlmBackend {
        LlmBackend::HuggingFace
    }

    fn set_generation_model(&mut self, model_id: &str) {
        self.generation_model_id = Some(model_id.to_string());
    }

    async fn generate_text(
        &self,
        prompt: &str,
        chat_history: &[ChatMessage],
        options: GenerationOptions,
    ) -> Result<String> {
        let mut messages = chat_history.to_vec();
        messages.push(self.construct_prompt(prompt, Role::User));
        log_failure(
            LlmBackend::HuggingFace,
            "generation",
            self.request_chat(&messages, options).await,
        )
    }

    fn construct_prompt(&self, text: &str, role: Role) -> ChatMessage {
        ChatMessage {
            role: openai_role(role).to_string(),
            content: text.to_string(),
        }
    }

    fn process_text(&self, text: &str) -> String {
        truncate_text(text, self.defaults.input_max_characters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pooled_output() {
        let output: FeatureExtraction =
            serde_json::from_value(json!([[0.1, 0.2], [0.3, 0.4]])).unwrap();
        assert_eq!(output.into_vectors(), vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[test]
    fn test_token_output_is_mean_pooled() {
        let output: FeatureExtraction =
            serde_json::from_value(json!([[[1.0, 2.0], [3.0, 4.0]]])).unwrap();
        assert_eq!(output.into_vectors(), vec![vec![2.0, 3.0]]);
    }

    #[test]
    fn test_feature_extraction_url() {
        let provider = HuggingFaceProvider::new("hf_x", ProviderDefaults::default())
            .unwrap()
            .with_base_url("http://localhost:9000/");
        assert_eq!(
            provider.feature_extraction_url("sentence-transformers/all-MiniLM-L6-v2"),
            "http://localhost:9000/hf-inference/models/sentence-transformers/all-MiniLM-L6-v2/pipeline/feature-extraction"
        );
    }
}
