use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::services::pattern_store::PatternStoreError;

/// Produces a fixed-length vector for a piece of text
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PatternStoreError>;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Embeddings from the gateway's OpenAI-compatible `/embeddings` endpoint
pub struct HttpEmbedder {
    gateway_url: String,
    api_key: Option<String>,
    model: String,
    http_client: HttpClient,
}

impl HttpEmbedder {
    pub fn new(config: &LlmConfig, timeout: Duration) -> Result<Self, PatternStoreError> {
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PatternStoreError::Embedding(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            gateway_url: config.gateway_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.embedding_model.clone(),
            http_client,
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PatternStoreError> {
        let mut request = self
            .http_client
            .post(format!("{}/embeddings", self.gateway_url))
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            });

        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| PatternStoreError::Embedding(format!("Embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(PatternStoreError::Embedding(format!(
                "Embedding service returned {}",
                response.status()
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| PatternStoreError::Embedding(format!("Malformed embedding response: {}", e)))?;

        body.data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .filter(|embedding| !embedding.is_empty())
            .ok_or_else(|| PatternStoreError::Embedding("Embedding response was empty".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_embed_reads_first_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(serde_json::json!({"input": "top customers"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.1, 0.2, 0.3], "index": 0}]
            })))
            .mount(&server)
            .await;

        let config = LlmConfig {
            gateway_url: server.uri(),
            ..LlmConfig::default()
        };
        let embedder = HttpEmbedder::new(&config, Duration::from_secs(2)).unwrap();
        let vector = embedder.embed("top customers").await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_embed_failure_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config = LlmConfig {
            gateway_url: server.uri(),
            ..LlmConfig::default()
        };
        let embedder = HttpEmbedder::new(&config, Duration::from_secs(2)).unwrap();
        assert!(matches!(
            embedder.embed("anything").await,
            Err(PatternStoreError::Embedding(_))
        ));
    }
}
