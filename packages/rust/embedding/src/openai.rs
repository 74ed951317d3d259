//! OpenAI-compatible embeddings client.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use ragforge_shared::{RagForgeError, Result};

use crate::provider::EmbeddingProvider;

/// Request timeout. Embedding batches can be large; the provider is slow
/// on cold models.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Async embeddings client for OpenAI-compatible `/embeddings` endpoints.
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedder {
    /// Build a new client. The handle is created once at startup and passed
    /// into the pipeline; there is no global singleton.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: impl Into<String>,
        dimension: usize,
    ) -> Result<Self> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(RagForgeError::config("embedding API key is empty"));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {api_key}");
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| RagForgeError::config("embedding API key contains invalid bytes"))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| RagForgeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.into(),
            dimension,
        })
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(count = texts.len(), model = %self.model, "embedding request");

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagForgeError::Network(format!("embeddings request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            // Keep the provider's message intact: token-limit detection
            // pattern-matches on it downstream.
            return Err(RagForgeError::Embedding(format!("HTTP {status}: {body}")));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RagForgeError::Embedding(format!("malformed response: {e}")))?;

        // The API may return entries out of order; the index field is
        // authoritative.
        parsed.data.sort_by_key(|entry| entry.index);

        if parsed.data.len() != texts.len() {
            return Err(RagForgeError::Embedding(format!(
                "provider returned {} embeddings for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }

        Ok(parsed.data.into_iter().map(|e| e.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    index: usize,
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn embeds_and_restores_provider_order() {
        let server = MockServer::start().await;

        // Entries deliberately out of order; the client must re-sort.
        let body = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]},
            ]
        });

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new("test-key", &server.uri(), "test-model", 2).unwrap();
        let vectors = embedder
            .embed(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn surfaces_provider_error_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_string("This model's maximum context length is 8192 tokens"),
            )
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new("test-key", &server.uri(), "test-model", 2).unwrap();
        let err = embedder.embed(&["too big".to_string()]).await.unwrap_err();
        assert!(err.is_token_limit());
    }

    #[tokio::test]
    async fn rejects_count_mismatch() {
        let server = MockServer::start().await;

        let body = serde_json::json!({
            "data": [{"index": 0, "embedding": [1.0]}]
        });

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new("test-key", &server.uri(), "test-model", 1).unwrap();
        let err = embedder
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("1 embeddings for 2 inputs"));
    }

    #[test]
    fn empty_api_key_rejected() {
        assert!(OpenAiEmbedder::new("  ", "http://localhost", "m", 2).is_err());
    }
}
