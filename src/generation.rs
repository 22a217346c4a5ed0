//! Generation client: wraps an Ollama-compatible `/api/generate` endpoint.
//! Used only by the query expander — the core search path never calls this.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::GenerationConfig;

#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub num_predict: i32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            num_predict: 256,
        }
    }
}

#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, prompt: &str, params: GenerationParams) -> Result<String>;
}

pub struct OllamaGenerationClient {
    http: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaGenerationClient {
    pub fn new(config: &GenerationConfig) -> Result<Option<Self>> {
        let Some(model) = config.model.clone() else {
            return Ok(None);
        };
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build generation HTTP client")?;
        Ok(Some(Self {
            http,
            url: config.url.trim_end_matches('/').to_string(),
            model,
        }))
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[async_trait]
impl GenerationClient for OllamaGenerationClient {
    async fn generate(&self, prompt: &str, params: GenerationParams) -> Result<String> {
        let endpoint = format!("{}/api/generate", self.url);
        let response = self
            .http
            .post(&endpoint)
            .json(&serde_json::json!({
                "model": self.model,
                "prompt": prompt,
                "stream": false,
                "options": {
                    "temperature": params.temperature,
                    "top_p": params.top_p,
                    "num_predict": params.num_predict,
                },
            }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .context("generation request failed")?;

        let parsed: GenerateResponse = response
            .json()
            .await
            .context("failed to parse generation response")?;
        Ok(parsed.response)
    }
}
