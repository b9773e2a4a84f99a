//! HTTP client for the LLM extraction service.
//!
//! The service speaks the messages-API shape: POST a prompt, get back a
//! `content` array whose first text block holds the model's reply. The
//! `ExtractionClient` trait is the seam — the engine only sees "prompt in,
//! text out", and tests substitute a stub.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::config::ExtractionServiceConfig;
use crate::error::PipelineError;

/// Prompt in, response text out. Implementations must enforce their own
/// timeout — the fallback extractor is waiting on the other side of it.
#[async_trait]
pub trait ExtractionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, PipelineError>;
}

/// Client for the hosted extraction service.
pub struct HttpExtractionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    timeout_secs: u64,
}

impl HttpExtractionClient {
    pub fn new(config: &ExtractionServiceConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                PipelineError::Configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl ExtractionClient for HttpExtractionClient {
    async fn complete(&self, prompt: &str) -> Result<String, PipelineError> {
        let body = json!({
            "model": self.model,
            "max_tokens": 1024,
            "messages": [
                { "role": "user", "content": prompt }
            ]
        });

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("anthropic-version", "2023-06-01")
            .json(&body);

        if let Some(ref key) = self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PipelineError::ServiceTimeout(self.timeout_secs)
            } else {
                PipelineError::Service(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let snippet: String = response.text().await.unwrap_or_default();
            return Err(PipelineError::Service(format!(
                "Extraction service returned {}: {}",
                status,
                snippet.chars().take(200).collect::<String>()
            )));
        }

        let envelope: serde_json::Value = response.json().await.map_err(|e| {
            PipelineError::Service(format!("Failed to read response body: {}", e))
        })?;

        parse_envelope(&envelope).ok_or_else(|| {
            PipelineError::Service("Response envelope had no text content".to_string())
        })
    }
}

/// Pull the reply text out of the service's response envelope.
fn parse_envelope(envelope: &serde_json::Value) -> Option<String> {
    envelope
        .get("content")?
        .as_array()?
        .iter()
        .find(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
        .and_then(|block| block.get("text"))
        .and_then(|t| t.as_str())
        .map(|s| s.to_string())
}
