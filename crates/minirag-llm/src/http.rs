//! HTTP plumbing shared by the network-backed providers

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;

use minirag_core::{EmbeddingModel, Error, LlmBackend, Result, truncate_text};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Build the HTTP client every provider uses
pub(crate) fn build_client() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| Error::Network(e.to_string()))
}

/// Send a request and decode a JSON body, turning non-2xx answers into errors.
///
/// `wrap` chooses the error variant (embedding or generation) so callers can
/// tell which gateway failed.
pub(crate) async fn send_json<T, W>(request: RequestBuilder, backend: LlmBackend, wrap: W) -> Result<T>
where
    T: DeserializeOwned,
    W: Fn(String) -> Error,
{
    let response = request
        .send()
        .await
        .map_err(|e| Error::Network(format!("{} request failed: {}", backend, e)))?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(wrap(format!(
            "{} API request failed with status {}: {}",
            backend, status, error_text
        )));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| Error::Serialization(format!("{} response: {}", backend, e)))
}

/// Truncate every input to the backend's character limit
pub(crate) fn prepare_inputs(texts: &[String], max_chars: usize) -> Vec<String> {
    texts.iter().map(|t| truncate_text(t, max_chars)).collect()
}

/// Check a batch of returned vectors and record the dimension on first success.
pub(crate) fn finish_embeddings(
    model: &EmbeddingModel,
    backend: LlmBackend,
    expected: usize,
    vectors: Vec<Vec<f32>>,
) -> Result<Vec<Vec<f32>>> {
    if vectors.len() != expected {
        return Err(Error::Embedding(format!(
            "{} returned {} embeddings for {} inputs",
            backend,
            vectors.len(),
            expected
        )));
    }
    if vectors.iter().any(|v| v.is_empty()) {
        return Err(Error::EmptyResponse(format!(
            "{} returned an empty embedding",
            backend
        )));
    }
    if let Some(first) = vectors.first() {
        if model.observe(first.len()) {
            tracing::info!(
                backend = %backend,
                dimension = first.len(),
                "auto-detected embedding size"
            );
        }
    }
    Ok(vectors)
}

/// Log a gateway failure and pass it on
pub(crate) fn log_failure<T>(backend: LlmBackend, what: &str, result: Result<T>) -> Result<T> {
    if let Err(ref e) = result {
        tracing::error!(backend = %backend, "{} failed: {}", what, e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_embeddings_records_dimension() {
        let model = EmbeddingModel::new("m", None);
        let vectors = finish_embeddings(&model, LlmBackend::OpenAI, 2, vec![vec![0.1; 4], vec![0.2; 4]])
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(model.dimension(), Some(4));
    }

    #[test]
    fn test_finish_embeddings_rejects_count_mismatch() {
        let model = EmbeddingModel::new("m", None);
        let err = finish_embeddings(&model, LlmBackend::Gemini, 2, vec![vec![0.1; 4]]).unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
        assert_eq!(model.dimension(), None);
    }

    #[test]
    fn test_finish_embeddings_rejects_empty_vector() {
        let model = EmbeddingModel::new("m", None);
        let err = finish_embeddings(&model, LlmBackend::Ollama, 1, vec![vec![]]).unwrap_err();
        assert!(matches!(err, Error::EmptyResponse(_)));
    }

    #[test]
    fn test_prepare_inputs_truncates() {
        let inputs = prepare_inputs(&["abcdef".to_string(), " xy ".to_string()], 3);
        assert_eq!(inputs, vec!["abc".to_string(), "xy".to_string()]);
    }
}
