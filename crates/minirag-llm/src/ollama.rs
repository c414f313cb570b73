//! Ollama provider for locally served models

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use minirag_core::{
    ChatMessage, EmbedPurpose, EmbeddingModel, EmbeddingProvider, Error, GenerationOptions,
    GenerationProvider, LlmBackend, ProviderDefaults, Result, Role, truncate_text,
};

use crate::http::{build_client, finish_embeddings, log_failure, prepare_inputs, send_json};
use crate::openai::openai_role;

const DEFAULT_HOST: &str = "http://localhost:11434";

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct ChatOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: ChatOptions,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ChatMessage>,
}

/// Ollama provider
pub struct OllamaProvider {
    host: String,
    defaults: ProviderDefaults,
    generation_model_id: Option<String>,
    embedding: EmbeddingModel,
    client: Client,
}

impl OllamaProvider {
    /// Create a provider for `host`, defaulting to the local daemon.
    pub fn new(host: Option<String>, defaults: ProviderDefaults) -> Result<Self> {
        Ok(Self {
            host: host
                .unwrap_or_else(|| DEFAULT_HOST.to_string())
                .trim_end_matches('/')
                .to_string(),
            defaults,
            generation_model_id: None,
            embedding: EmbeddingModel::default(),
            client: build_client()?,
        })
    }

    /// Nomic-style task prefix, e.g. `search_query: who was tesla`
    fn with_task_prefix(inputs: Vec<String>, purpose: EmbedPurpose) -> Vec<String> {
        match purpose.task_type(LlmBackend::Ollama) {
            Some(task) => inputs
                .into_iter()
                .map(|text| format!("{}: {}", task, text))
                .collect(),
            None => inputs,
        }
    }

    async fn request_embeddings(&self, inputs: Vec<String>, purpose: EmbedPurpose) -> Result<Vec<Vec<f32>>> {
        let model = self.embedding.model_id()?;
        let expected = inputs.len();
        let body = EmbedRequest {
            model,
            input: Self::with_task_prefix(inputs, purpose),
            dimensions: self.embedding.configured_dimension(),
        };

        let request = self
            .client
            .post(format!("{}/api/embed", self.host))
            .json(&body);

        let response: EmbedResponse =
            send_json(request, LlmBackend::Ollama, Error::Embedding).await?;

        finish_embeddings(&self.embedding, LlmBackend::Ollama, expected, response.embeddings)
    }

    async fn request_chat(&self, messages: &[ChatMessage], options: GenerationOptions) -> Result<String> {
        let model = self.generation_model_id.as_deref().ok_or_else(|| {
            Error::Configuration("generation model for Ollama provider is not set".to_string())
        })?;

        let body = ChatRequest {
            model,
            messages,
            stream: false,
            options: ChatOptions {
                num_predict: options.max_tokens.unwrap_or(self.defaults.output_max_tokens),
                temperature: options.temperature.unwrap_or(self.defaults.temperature),
            },
        };

        let request = self
            .client
            .post(format!("{}/api/chat", self.host))
            .json(&body);

        let response: ChatResponse =
            send_json(request, LlmBackend::Ollama, Error::Generation).await?;

        response
            .message
            .map(|m| m.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::EmptyResponse("Ollama returned no message".to_string()))
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn backend(&self) -> LlmBackend {
        LlmBackend::Ollama
    }

    fn set_embedding_model(&mut self, model_id: &str, dimension: Option<usize>) {
        self.embedding = EmbeddingModel::new(model_id, dimension);
    }

    fn embedding_dimension(&self) -> Option<usize> {
        self.embedding.dimension()
    }

    async fn embed_texts(&self, texts: &[String], purpose: EmbedPurpose) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let inputs = prepare_inputs(texts, self.defaults.input_max_characters);
        log_failure(
            LlmBackend::Ollama,
            "embedding",
            self.request_embeddings(inputs, purpose).await,
        )
    }
}

#[async_trait]
impl GenerationProvider for OllamaProvider {
    fn backend(&self) -> LlmBackend {
        LlmBackend::Ollama
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
            LlmBackend::Ollama,
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
