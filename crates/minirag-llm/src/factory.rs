//! Build providers from settings

use minirag_core::{
    EmbeddingProvider, Error, GenerationProvider, LlmBackend, Result, Settings,
};

use crate::{GeminiProvider, HuggingFaceProvider, LocalEmbeddingProvider, OllamaProvider, OpenAIProvider};

/// Selects and constructs backends by name. Models are set by the caller.
pub struct ProviderFactory {
    settings: Settings,
}

impl ProviderFactory {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    fn parse_backend(name: &str) -> Result<LlmBackend> {
        LlmBackend::parse(name)
            .ok_or_else(|| Error::Configuration(format!("unknown model backend: {}", name)))
    }

    fn require(value: &Option<String>, key: &str) -> Result<String> {
        value
            .clone()
            .ok_or_else(|| Error::Configuration(format!("{} is required for this backend", key)))
    }

    pub fn create_embedding(&self, backend: &str) -> Result<Box<dyn EmbeddingProvider>> {
        let defaults = self.settings.provider_defaults();
        let provider: Box<dyn EmbeddingProvider> = match Self::parse_backend(backend)? {
            LlmBackend::OpenAI => Box::new(OpenAIProvider::new(
                Self::require(&self.settings.openai_api_key, "OPENAI_API_KEY")?,
                self.settings.openai_api_url.clone(),
                defaults,
            )?),
            LlmBackend::Gemini => Box::new(GeminiProvider::new(
                Self::require(&self.settings.gemini_api_key, "GEMINI_API_KEY")?,
                defaults,
            )?),
            LlmBackend::Ollama => Box::new(OllamaProvider::new(
                self.settings.ollama_host.clone(),
                defaults,
            )?),
            LlmBackend::HuggingFace => Box::new(HuggingFaceProvider::new(
                Self::require(&self.settings.hugging_face_api_key, "HUGGING_FACE_API_KEY")?,
                defaults,
            )?),
            LlmBackend::Local => Box::new(LocalEmbeddingProvider::new(defaults)),
        };
        tracing::debug!(backend = %provider.backend(), "embedding provider created");
        Ok(provider)
    }

    pub fn create_generation(&self, backend: &str) -> Result<Box<dyn GenerationProvider>> {
        let defaults = self.settings.provider_defaults();
        let provider: Box<dyn GenerationProvider> = match Self::parse_backend(backend)? {
            LlmBackend::OpenAI => Box::new(OpenAIProvider::new(
                Self::require(&self.settings.openai_api_key, "OPENAI_API_KEY")?,
                self.settings.openai_api_url.clone(),
                defaults,
            )?),
            LlmBackend::Gemini => Box::new(GeminiProvider::new(
                Self::require(&self.settings.gemini_api_key, "GEMINI_API_KEY")?,
                defaults,
            )?),
            LlmBackend::Ollama => Box::new(OllamaProvider::new(
                self.settings.ollama_host.clone(),
                defaults,
            )?),
            LlmBackend::HuggingFace => Box::new(HuggingFaceProvider::new(
                Self::require(&self.settings.hugging_face_api_key, "HUGGING_FACE_API_KEY")?,
                defaults,
            )?),
            LlmBackend::Local => {
                return Err(Error::Configuration(
                    "the local backend only provides embeddings".to_string(),
                ));
            }
        };
        tracing::debug!(backend = %provider.backend(), "generation provider created");
        Ok(provider)
    }
}
