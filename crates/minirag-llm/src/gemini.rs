//! Google Gemini provider

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use minirag_core::{
    ChatMessage, EmbedPurpose, EmbeddingModel, EmbeddingProvider, Error, GenerationOptions,
    GenerationProvider, LlmBackend, ProviderDefaults, Result, Role, truncate_text,
};

use crate::http::{build_client, finish_embeddings, log_failure, prepare_inputs, send_json};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest {
    model: String,
    content: Content,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedContentRequest>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateResponse {
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().map(|p| p.text).collect();
        if text.trim().is_empty() { None } else { Some(text) }
    }
}

/// Gemini provider using the REST `generativelanguage` API
pub struct GeminiProvider {
    api_key: String,
    base_url: String,
    defaults: ProviderDefaults,
    generation_model_id: Option<String>,
    embedding: EmbeddingModel,
    client: Client,
}

impl GeminiProvider {
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

    fn model_path(model_id: &str) -> String {
        if model_id.starts_with("models/") {
            model_id.to_string()
        } else {
            format!("models/{}", model_id)
        }
    }

    fn batch_request(&self, model: &str, inputs: &[String], purpose: EmbedPurpose) -> BatchEmbedRequest {
        let model = Self::model_path(model);
        let task_type = purpose
            .task_type(LlmBackend::Gemini)
            .map(|t| t.to_uppercase());

        BatchEmbedRequest {
            requests: inputs
                .iter()
                .map(|text| EmbedContentRequest {
                    model: model.clone(),
                    content: Content {
                        role: None,
                        parts: vec![Part { text: text.clone() }],
                    },
                    task_type: task_type.clone(),
                    output_dimensionality: self.embedding.configured_dimension(),
                })
                .collect(),
        }
    }

    /// Split a chat into Gemini's system instruction and turn list.
    fn generate_request(&self, messages: &[ChatMessage], options: GenerationOptions) -> GenerateRequest {
        let mut system = Vec::new();
        let mut contents = Vec::new();

        for message in messages {
            if message.role == "system" {
                system.push(Part {
                    text: message.content.clone(),
                });
            } else {
                contents.push(Content {
                    role: Some(message.role.clone()),
                    parts: vec![Part {
                        text: message.content.clone(),
                    }],
                });
            }
        }

        GenerateRequest {
            system_instruction: if system.is_empty() {
                None
            } else {
                Some(Content {
                    role: None,
                    parts: system,
                })
            },
            contents,
            generation_config: GenerationConfig {
                max_output_tokens: options.max_tokens.unwrap_or(self.defaults.output_max_tokens),
                temperature: options.temperature.unwrap_or(self.defaults.temperature),
            },
        }
    }

    async fn request_embeddings(&self, inputs: &[String], purpose: EmbedPurpose) -> Result<Vec<Vec<f32>>> {
        let model = self.embedding.model_id()?;
        let body = self.batch_request(model, inputs, purpose);

        let request = self
            .client
            .post(format!(
                "{}/{}:batchEmbedContents",
                self.base_url,
                Self::model_path(model)
            ))
            .query(&[("key", &self.api_key)])
            .json(&body);

        let response: BatchEmbedResponse =
            send_json(request, LlmBackend::Gemini, Error::Embedding).await?;

        let vectors = response.embeddings.into_iter().map(|e| e.values).collect();
        finish_embeddings(&self.embedding, LlmBackend::Gemini, inputs.len(), vectors)
    }

    async fn request_generation(&self, messages: &[ChatMessage], options: GenerationOptions) -> Result<String> {
        let model = self.generation_model_id.as_deref().ok_or_else(|| {
            Error::Configuration("generation model for Gemini provider is not set".to_string())
        })?;

        let body = self.generate_request(messages, options);
        let request = self
            .client
            .post(format!(
                "{}/{}:generateContent",
                self.base_url,
                Self::model_path(model)
            ))
            .query(&[("key", &self.api_key)])
            .json(&body);

        let response: GenerateResponse =
            send_json(request, LlmBackend::Gemini, Error::Generation).await?;

        response
            .into_text()
            .ok_or_else(|| Error::EmptyResponse("Gemini returned no candidate text".to_string()))
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn backend(&self) -> LlmBackend {
        LlmBackend::Gemini
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
            LlmBackend::Gemini,
            "embedding",
            self.request_embeddings(&inputs, purpose).await,
        )
    }
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    fn backend(&self) -> LlmBackend {
        LlmBackend::Gemini
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
            LlmBackend::Gemini,
            "generation",
            self.request_generation(&messages, options).await,
        )
    }

    fn construct_prompt(&self, text: &str, role: Role) -> ChatMessage {
        let role = match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "model",
        };
        ChatMessage {
            role: role.to_string(),
            content: text.to_string(),
        }
    }

    fn process_text(&self, text: &str) -> String {
        truncate_text(text, self.defaults.input_max_characters)
    }
}
