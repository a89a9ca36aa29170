//! Ollama planner implementation

use super::types::{GenerateRequest, GenerateResponse};
use crate::providers::{invalid_response, transport_error};
use crate::Planner;
use async_trait::async_trait;
use cobuild_core::PlannerError;
use reqwest::Client;
use std::time::Duration;

const PROVIDER: &str = "ollama";

/// Connection settings for an Ollama-style generate endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OllamaConfig {
    /// Full endpoint URL, e.g. `http://127.0.0.1:11434/api/generate`.
    pub endpoint: String,
    pub model: String,
    pub timeout: Duration,
    /// Ask the model for JSON-only output.
    pub json_mode: bool,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:11434/api/generate".to_string(),
            model: "llama3".to_string(),
            timeout: Duration::from_secs(60),
            json_mode: true,
        }
    }
}

/// Planner backed by a local Ollama server.
pub struct OllamaPlanner {
    client: Client,
    config: OllamaConfig,
}

impl OllamaPlanner {
    /// Build a planner whose requests are bounded by `config.timeout`.
    pub fn new(config: OllamaConfig) -> Result<Self, PlannerError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PlannerError::Unreachable {
                provider: PROVIDER.to_string(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client, config })
    }

    fn request(&self, prompt: &str) -> GenerateRequest {
        GenerateRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            format: self.config.json_mode.then(|| "json".to_string()),
        }
    }
}

#[async_trait]
impl Planner for OllamaPlanner {
    async fn propose(&self, prompt: &str) -> Result<String, PlannerError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&self.request(prompt))
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, self.config.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PlannerError::RequestFailed {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| invalid_response(PROVIDER, format!("Failed to parse response: {}", e)))?;
        if !body.done {
            tracing::debug!(model = %self.config.model, "Ollama reported an unfinished generation");
        }
        Ok(body.response)
    }

    fn provider(&self) -> &str {
        PROVIDER
    }
}

impl std::fmt::Debug for OllamaPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaPlanner")
            .field("endpoint", &self.config.endpoint)
            .field("model", &self.config.model)
            .field("timeout", &self.config.timeout)
            .finish()
    }
}
