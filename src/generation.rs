//! Generation provider implementations.
//!
//! [`OpenRouterProvider`] posts an OpenAI-style chat-completions request to
//! OpenRouter (or any compatible endpoint). [`DisabledGenerator`] stands in
//! when generation is switched off or no API key is available; every answer
//! then fails with sources still attached.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use clinical_rag_core::generation::{Completion, GenerationProvider, GenerationRequest, TokenUsage};
use clinical_rag_core::GenerationError;

use crate::config::GenerationConfig;

/// Maximum characters of an upstream error body kept for logs and errors.
const ERROR_BODY_CHARS: usize = 200;

/// Create the provider named by `config.provider`.
///
/// `openrouter` needs `OPENROUTER_API_KEY`; without it the service still
/// starts, with a warning, and uses [`DisabledGenerator`].
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn GenerationProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openrouter" => match std::env::var("OPENROUTER_API_KEY") {
            Ok(key) if !key.trim().is_empty() => {
                Ok(Arc::new(OpenRouterProvider::new(config, key)?))
            }
            _ => {
                tracing::warn!(
                    "OPENROUTER_API_KEY not set; answers will carry sources but no generated text"
                );
                Ok(Arc::new(DisabledGenerator))
            }
        },
        other => anyhow::bail!("Unknown generation provider: {}", other),
    }
}

/// A provider that refuses every request.
pub struct DisabledGenerator;

#[async_trait]
impl GenerationProvider for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<Completion, GenerationError> {
        Err(GenerationError::Disabled)
    }
}

/// Chat-completions client for OpenRouter.
pub struct OpenRouterProvider {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    referer: String,
    title: String,
}

impl OpenRouterProvider {
    pub fn new(config: &GenerationConfig, api_key: String) -> Result<Self> {
        // per-request timeouts come from GenerationRequest
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            api_key,
            model: config.model.clone(),
            referer: config.referer.clone(),
            title: config.title.clone(),
        })
    }
}

#[async_trait]
impl GenerationProvider for OpenRouterProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Completion, GenerationError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        let timeout_secs = request.timeout.as_secs();
        let transport = |e: reqwest::Error| {
            if e.is_timeout() {
                tracing::error!(timeout_secs, "generation request timed out");
                GenerationError::Timeout { secs: timeout_secs }
            } else {
                GenerationError::Transport(e.to_string())
            }
        };

        let response = self
            .client
            .post(&self.url)
            .timeout(request.timeout)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body: String = text.chars().take(ERROR_BODY_CHARS).collect();
            tracing::error!(status = status.as_u16(), body = %body, "generation provider error");
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response.json().await.map_err(transport)?;
        parse_completion(&json)
    }
}

/// Extract `choices[0].message.content` plus optional `usage` and cost.
pub fn parse_completion(json: &serde_json::Value) -> Result<Completion, GenerationError> {
    let text = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| {
            GenerationError::InvalidResponse("missing choices[0].message.content".to_string())
        })?;

    let usage = json
        .get("usage")
        .and_then(|u| serde_json::from_value::<TokenUsage>(u.clone()).ok());
    let cost = json
        .pointer("/usage/cost")
        .or_else(|| json.get("cost"))
        .and_then(|c| c.as_f64());

    Ok(Completion {
        text: text.trim().to_string(),
        usage,
        cost,
    })
}
