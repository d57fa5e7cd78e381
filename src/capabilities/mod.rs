//! Capability contracts
//!
//! The pipeline only talks to the outside world through these two traits, so
//! tests can substitute deterministic doubles without touching stage logic.
//!
//! - [`VisionReasoning`]: image + prompt in, structured text out
//! - [`WebSearch`]: query in, ranked snippets out

use async_trait::async_trait;

use crate::config::VisionConfig;
use crate::llm::{LLMProviderConfig, LLM};
use crate::models::ImagePayload;
use crate::search::{SearchHit, SerperClient};
use crate::types::{AppResult, LLMMessage, LLMRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisionTask {
    Identify,
    Explain,
    Extract,
    Instruct,
}

impl VisionTask {
    fn temperature(&self) -> f32 {
        match self {
            VisionTask::Identify => 0.2,
            VisionTask::Explain => 0.4,
            VisionTask::Extract => 0.1,
            VisionTask::Instruct => 0.3,
        }
    }
}

impl std::fmt::Display for VisionTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VisionTask::Identify => write!(f, "identify"),
            VisionTask::Explain => write!(f, "explain"),
            VisionTask::Extract => write!(f, "extract"),
            VisionTask::Instruct => write!(f, "instruct"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub task: VisionTask,
    pub system: String,
    pub prompt: String,
    pub image: Option<ImagePayload>,
}

#[async_trait]
pub trait VisionReasoning: Send + Sync {
    async fn reason(&self, request: &VisionRequest) -> AppResult<String>;
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> AppResult<Vec<SearchHit>>;
}

/// Vision-reasoning capability backed by a chat completions provider
pub struct LlmVision {
    llm: LLM,
    vision_model: String,
    reasoning_model: String,
    max_tokens: u32,
}

impl LlmVision {
    pub fn new(llm: LLM, vision_model: impl Into<String>, reasoning_model: impl Into<String>) -> Self {
        Self {
            llm,
            vision_model: vision_model.into(),
            reasoning_model: reasoning_model.into(),
            max_tokens: 2048,
        }
    }

    /// Build on an existing HTTP client so every capability shares one pool
    pub fn with_client(client: reqwest::Client, config: &VisionConfig) -> AppResult<Self> {
        let llm = LLM::with_client(LLMProviderConfig::from_vision_config(config), client)?;
        Ok(Self::new(llm, &config.vision_model, &config.reasoning_model).with_max_tokens(config.max_tokens))
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn build_request(&self, request: &VisionRequest) -> LLMRequest {
        let (model, message) = match &request.image {
            Some(image) => (
                self.vision_model.clone(),
                LLMMessage::user_with_base64_image(
                    request.prompt.clone(),
                    image.to_base64(),
                    image.format().media_type(),
                ),
            ),
            None => (self.reasoning_model.clone(), LLMMessage::user(request.prompt.clone())),
        };

        LLMRequest {
            model,
            messages: vec![message],
            max_tokens: Some(self.max_tokens),
            temperature: Some(request.task.temperature()),
            system_instruction: Some(request.system.clone()),
        }
    }
}

#[async_trait]
impl VisionReasoning for LlmVision {
    async fn reason(&self, request: &VisionRequest) -> AppResult<String> {
        let llm_request = self.build_request(request);
        let response = self.llm.create_chat_completion(&llm_request).await?;
        tracing::debug!(
            task = %request.task,
            model = %llm_request.model,
            total_tokens = response.usage.total_tokens,
            "Vision capability answered"
        );
        Ok(response.content)
    }
}

#[async_trait]
impl WebSearch for SerperClient {
    async fn search(&self, query: &str) -> AppResult<Vec<SearchHit>> {
        SerperClient::search(self, query).await
    }
}
