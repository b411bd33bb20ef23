use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client as HttpClient;
use serde_json::json;

use crate::config::LlmConfig;
use crate::services::prompt_builder::Prompt;
use crate::services::translation_stream::{TranslationError, TranslationStream};
use crate::models::TranslationResult;

/// Turns a built prompt into a structured translation
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, prompt: &Prompt) -> Result<TranslationResult, TranslationError>;
}

/// Client for an OpenAI-compatible chat completions gateway, streamed
pub struct LlmTranslationClient {
    gateway_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
    http_client: HttpClient,
}

impl LlmTranslationClient {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            gateway_url: config.gateway_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
            http_client: HttpClient::new(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.gateway_url)
    }

    async fn run(
        &self,
        stream: &mut TranslationStream,
        prompt: &Prompt,
    ) -> Result<TranslationResult, TranslationError> {
        stream.begin()?;

        let mut request = self.http_client.post(self.completions_url()).json(&json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.instruction},
            ],
            "stream": true,
            "temperature": self.temperature,
            "top_p": 1,
            "max_tokens": self.max_tokens,
        }));

        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| TranslationError::Service(format!("Failed to call translation service: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TranslationError::Service(format!(
                "Translation service returned error {}: {}",
                status, error_text
            )));
        }

        stream.on_response()?;

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk
                .map_err(|e| TranslationError::Service(format!("Translation stream interrupted: {}", e)))?;
            if stream.push_chunk(&chunk)? {
                break;
            }
        }

        stream.finish()
    }
}

#[async_trait]
impl Translator for LlmTranslationClient {
    async fn translate(&self, prompt: &Prompt) -> Result<TranslationResult, TranslationError> {
        let mut stream = TranslationStream::new();

        let outcome = match tokio::time::timeout(self.timeout, self.run(&mut stream, prompt)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TranslationError::Timeout(self.timeout.as_secs())),
        };

        if let Err(e) = &outcome {
            stream.fail(e);
            tracing::warn!("Translation failed: {}", e);
        } else {
            tracing::debug!("Translation completed with model {}", self.model);
        }

        outcome
    }
}
