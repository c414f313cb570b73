//! OpenAI (and OpenAI-compatible) provider

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use minirag_core::{
    ChatMessage, EmbedPurpose, EmbeddingModel, EmbeddingProvider, Error, GenerationOptions,
    GenerationProvider, LlmBackend, ProviderDefaults, Result, Role, truncate_text,
};

use crate::http::{build_client, finish_embeddings, log_failure, prepare_inputs, send_json};

const DEFAULT_API_URL: &str = "https://api.openai.com/v1";

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
pub(crate) struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl ChatResponse {
    /// Text of the first choice, if any
    pub(crate) fn into_text(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
    }
}

/// Map a logical role onto the OpenAI chat vocabulary
pub(crate) fn openai_role(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

/// OpenAI provider
pub struct OpenAIProvider {
    api_key: String,
    api_url: String,
    defaults: ProviderDefaults,
    generation_model_id: Option<String>,
    embedding: EmbeddingModel,
    client: Client,
}

impl OpenAIProvider {
    /// Create a new provider. `api_url` defaults to the public OpenAI endpoint.
    pub fn new(api_key: impl Into<String>, api_url: Option<String>, defaults: ProviderDefaults) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            api_url: api_url
                .unwrap_or_else(|| DEFAULT_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            defaults,
            generation_model_id: None,
            embedding: EmbeddingModel::default(),
            client: build_client()?,
        })
    }

    fn embedding_request<'a>(&'a self, model: &'a str, input: &'a [String]) -> EmbeddingRequest<'a> {
        EmbeddingRequest {
            model,
            input,
            dimensions: self.embedding.configured_dimension(),
        }
    }

    async fn request_embeddings(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self.embedding.model_id()?;
        let body = self.embedding_request(model, inputs);

        let request = self
            .client
            .post(format!("{}/embeddings", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&body);

        let response: EmbeddingResponse =
            send_json(request, LlmBackend::OpenAI, Error::Embedding).await?;

        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        let vectors = data.into_iter().map(|d| d.embedding).collect();

        finish_embeddings(&self.embedding, LlmBackend::OpenAI, inputs.len(), vectors)
    }

    async fn request_chat(&self, messages: &[ChatMessage], options: GenerationOptions) -> Result<String> {
        let model = self.generation_model_id.as_deref().ok_or_else(|| {
            Error::Configuration("generation model for OpenAI provider is not set".to_string())
        })?;

        let body = ChatRequest {
            model,
            messages,
            max_tokens: options.max_tokens.unwrap_or(self.defaults.output_max_tokens),
            temperature: options.temperature.unwrap_or(self.defaults.temperature),
        };

        let request = self
            .client
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&body);

        let response: ChatResponse =
            send_json(request, LlmBackend::OpenAI, Error::Generation).await?;

        response
            .into_text()
            .ok_or_else(|| Error::EmptyResponse("OpenAI returned no completion text".to_string()))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn backend(&self) -> LlmBackend {
        LlmBackend::OpenAI
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
            LlmBackend::OpenAI,
            "embedding",
            self.request_embeddings(&inputs).await,
        )
    }
}

#[async_trait]
impl GenerationProvider for OpenAIProvider {
    fn backend(&self) -> LlmBackend {
        LlmBackend::OpenAI
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
            LlmBackend::OpenAI,
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
