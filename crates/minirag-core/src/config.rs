//! Process settings, read once at startup

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::{DistanceMetric, Error, ProviderDefaults, Result};

/// Settings for every component of the pipeline.
///
/// Backends are named by string and resolved by the factories; nothing here
/// is re-read after startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub generation_backend: String,
    pub embedding_backend: String,

    pub openai_api_key: Option<String>,
    pub openai_api_url: Option<String>,
    pub gemini_api_key: Option<String>,
    pub hugging_face_api_key: Option<String>,
    pub ollama_host: Option<String>,

    pub generation_model_id: Option<String>,
    pub embedding_model_id: Option<String>,
    pub embedding_size: Option<usize>,

    pub input_default_max_characters: usize,
    pub generation_default_max_tokens: u32,
    pub generation_default_temperature: f32,

    pub vector_db_backend: String,
    pub vector_db_url: Option<String>,
    pub vector_db_distance_metric: DistanceMetric,
    pub vector_db_pgvec_index_threshold: u64,
    pub vector_db_insert_batch_size: usize,
    pub postgres_url: Option<String>,

    pub primary_language: String,
    pub default_language: String,

    pub file_default_chunk_size: usize,
    pub file_default_chunk_overlap: usize,
    pub indexing_page_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            generation_backend: "openai".to_string(),
            embedding_backend: "openai".to_string(),
            openai_api_key: None,
            openai_api_url: None,
            gemini_api_key: None,
            hugging_face_api_key: None,
            ollama_host: None,
            generation_model_id: None,
            embedding_model_id: None,
            embedding_size: None,
            input_default_max_characters: 1000,
            generation_default_max_tokens: 1000,
            generation_default_temperature: 0.1,
            vector_db_backend: "memory".to_string(),
            vector_db_url: None,
            vector_db_distance_metric: DistanceMetric::Cosine,
            vector_db_pgvec_index_threshold: 1000,
            vector_db_insert_batch_size: 50,
            postgres_url: None,
            primary_language: "en".to_string(),
            default_language: "en".to_string(),
            file_default_chunk_size: 100,
            file_default_chunk_overlap: 20,
            indexing_page_size: 50,
        }
    }
}

impl Settings {
    /// Load settings from the environment, reading `.env` first if present
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Settings::default();

        let vector_db_distance_metric = match get("VECTOR_DB_DISTANCE_METRIC") {
            Some(raw) => DistanceMetric::parse(&raw)?,
            None => defaults.vector_db_distance_metric,
        };

        let settings = Settings {
            generation_backend: get("GENERATION_BACKEND").unwrap_or(defaults.generation_backend),
            embedding_backend: get("EMBEDDING_BACKEND").unwrap_or(defaults.embedding_backend),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_api_url: get("OPENAI_API_URL"),
            gemini_api_key: get("GEMINI_API_KEY"),
            hugging_face_api_key: get("HUGGING_FACE_API_KEY"),
            ollama_host: get("OLLAMA_HOST"),
            generation_model_id: get("GENERATION_MODEL_ID"),
            embedding_model_id: get("EMBEDDING_MODEL_ID"),
            embedding_size: parse_opt(&get, "EMBEDDING_SIZE")?,
            input_default_max_characters: parse_or(
                &get,
                "INPUT_DEFAULT_MAX_CHARACTERS",
                defaults.input_default_max_characters,
            )?,
            generation_default_max_tokens: parse_or(
                &get,
                "GENERATION_DEFAULT_MAX_TOKENS",
                defaults.generation_default_max_tokens,
            )?,
            generation_default_temperature: parse_or(
                &get,
                "GENERATION_DEFAULT_TEMPERATURE",
                defaults.generation_default_temperature,
            )?,
            vector_db_backend: get("VECTOR_DB_BACKEND").unwrap_or(defaults.vector_db_backend),
            vector_db_url: get("VECTOR_DB_URL"),
            vector_db_distance_metric,
            vector_db_pgvec_index_threshold: parse_or(
                &get,
                "VECTOR_DB_PGVEC_INDEX_THRESHOLD",
                defaults.vector_db_pgvec_index_threshold,
            )?,
            vector_db_insert_batch_size: parse_or(
                &get,
                "VECTOR_DB_INSERT_BATCH_SIZE",
                defaults.vector_db_insert_batch_size,
            )?,
            postgres_url: get("POSTGRES_URL"),
            primary_language: get("PRIMARY_LANGUAGE").unwrap_or(defaults.primary_language),
            default_language: get("DEFAULT_LANGUAGE").unwrap_or(defaults.default_language),
            file_default_chunk_size: parse_or(
                &get,
                "FILE_DEFAULT_CHUNK_SIZE",
                defaults.file_default_chunk_size,
            )?,
            file_default_chunk_overlap: parse_or(
                &get,
                "FILE_DEFAULT_CHUNK_OVERLAP",
                defaults.file_default_chunk_overlap,
            )?,
            indexing_page_size: parse_or(&get, "INDEXING_PAGE_SIZE", defaults.indexing_page_size)?,
        };

        settings.validate()?;
        tracing::debug!(
            generation = %settings.generation_backend,
            embedding = %settings.embedding_backend,
            vector_db = %settings.vector_db_backend,
            distance = %settings.vector_db_distance_metric,
            "settings loaded"
        );
        Ok(settings)
    }

    /// Limits handed to every model backend
    pub fn provider_defaults(&self) -> ProviderDefaults {
        ProviderDefaults {
            input_max_characters: self.input_default_max_characters,
            output_max_tokens: self.generation_default_max_tokens,
            temperature: self.generation_default_temperature,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.indexing_page_size == 0 {
            return Err(Error::Configuration(
                "INDEXING_PAGE_SIZE must be greater than zero".to_string(),
            ));
        }
        if self.vector_db_insert_batch_size == 0 {
            return Err(Error::Configuration(
                "VECTOR_DB_INSERT_BATCH_SIZE must be greater than zero".to_string(),
            ));
        }
        if self.file_default_chunk_size <= self.file_default_chunk_overlap {
            return Err(Error::Configuration(format!(
                "FILE_DEFAULT_CHUNK_SIZE ({}) must be larger than FILE_DEFAULT_CHUNK_OVERLAP ({})",
                self.file_default_chunk_size, self.file_default_chunk_overlap
            )));
        }
        Ok(())
    }
}

fn parse_opt<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Configuration(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(None),
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    Ok(parse_opt(get, key)?.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_empty() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_reads_values() {
        let settings = Settings::from_lookup(lookup(&[
            ("GENERATION_BACKEND", "gemini"),
            ("EMBEDDING_BACKEND", "ollama"),
            ("EMBEDDING_SIZE", "768"),
            ("VECTOR_DB_BACKEND", "pgvector"),
            ("VECTOR_DB_DISTANCE_METRIC", "dot"),
            ("INDEXING_PAGE_SIZE", "25"),
            ("GENERATION_DEFAULT_TEMPERATURE", "0.4"),
        ]))
        .unwrap();

        assert_eq!(settings.generation_backend, "gemini");
        assert_eq!(settings.embedding_backend, "ollama");
        assert_eq!(settings.embedding_size, Some(768));
        assert_eq!(settings.vector_db_backend, "pgvector");
        assert_eq!(settings.vector_db_distance_metric, DistanceMetric::Dot);
        assert_eq!(settings.indexing_page_size, 25);
        assert_eq!(settings.provider_defaults().temperature, 0.4);
    }

    #[test]
    fn test_blank_values_fall_back() {
        let settings = Settings::from_lookup(lookup(&[("EMBEDDING_SIZE", "  ")])).unwrap();
        assert_eq!(settings.embedding_size, None);
    }

    #[test]
    fn test_invalid_number_is_configuration_error() {
        let err = Settings::from_lookup(lookup(&[("EMBEDDING_SIZE", "big")])).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let err = Settings::from_lookup(lookup(&[
            ("FILE_DEFAULT_CHUNK_SIZE", "20"),
            ("FILE_DEFAULT_CHUNK_OVERLAP", "20"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
