use async_trait::async_trait;

use crate::config::VisionConfig;
use crate::types::{AppError, AppResult, LLMRequest, LLMResponse};

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse>;
}

/// Configuration for an LLM provider
pub struct LLMProviderConfig {
    pub name: String,
    pub api_key: String,
    pub base_url: Option<String>,
}

impl LLMProviderConfig {
    pub fn from_vision_config(config: &VisionConfig) -> Self {
        Self {
            name: "openrouter".to_string(),
            api_key: config.api_key.clone(),
            base_url: Some(config.base_url.clone()),
        }
    }
}

pub struct LLM {
    adapter: Box<dyn LLMAdapter>,
    provider_name: String,
}

impl LLM {
    pub fn new(provider: LLMProviderConfig) -> AppResult<Self> {
        Self::with_client(provider, reqwest::Client::new())
    }

    /// Build the adapter on a shared HTTP client
    pub fn with_client(provider: LLMProviderConfig, client: reqwest::Client) -> AppResult<Self> {
        if provider.api_key.trim().is_empty() {
            return Err(AppError::Config(format!(
                "No API key configured for provider '{}'",
                provider.name
            )));
        }

        let adapter: Box<dyn LLMAdapter> = match provider.name.as_str() {
            // Any OpenAI-compatible chat completions endpoint
            "openrouter" | "openai-compatible" => {
                let adapter = crate::llm::openrouter::OpenRouterAdapter::with_client(client, &provider.api_key);
                match &provider.base_url {
                    Some(base_url) => Box::new(adapter.with_base_url(base_url)),
                    None => Box::new(adapter),
                }
            }
            other => {
                return Err(AppError::Config(format!("Unsupported provider: {}", other)));
            }
        };

        Ok(Self {
            adapter,
            provider_name: provider.name,
        })
    }

    /// Wrap an existing adapter (used to share one HTTP client between models)
    pub fn from_adapter(name: impl Into<String>, adapter: Box<dyn LLMAdapter>) -> Self {
        Self {
            adapter,
            provider_name: name.into(),
        }
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        self.adapter.create_chat_completion(request).await
    }
}
