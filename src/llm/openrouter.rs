// OpenRouter adapter (OpenAI-compatible chat completions)
// API Reference: https://openrouter.ai/docs/api-reference/chat-completion
//
// Images are sent inline as base64 data URLs inside `image_url` content parts.

use crate::llm::provider::LLMAdapter;
use crate::types::{AppError, AppResult, ContentPart, LLMMessage, LLMRequest, LLMResponse, MessageContent, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
const APP_TITLE: &str = "Crop Doctor";

pub struct OpenRouterAdapter {
    client: Client,
    api_key: String,
    base_url: String,
}

// Request types
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: ChatContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ChatContent {
    Text(String),
    Multimodal(Vec<ChatContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum ChatContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

// Response types
#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl OpenRouterAdapter {
    pub fn new(api_key: &str) -> Self {
        Self::with_client(Client::new(), api_key)
    }

    /// Reuse an existing connection pool
    pub fn with_client(client: Client, api_key: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            base_url: OPENROUTER_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn convert_message(msg: &LLMMessage) -> ChatMessage {
        let content = match &msg.content {
            MessageContent::Text(text) => ChatContent::Text(text.clone()),
            MessageContent::Multimodal(parts) => ChatContent::Multimodal(
                parts
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text { text } => ChatContentPart::Text { text: text.clone() },
                        ContentPart::ImageBase64 { base64, media_type } => ChatContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: format!("data:{};base64,{}", media_type, base64),
                            },
                        },
                    })
                    .collect(),
            ),
        };

        ChatMessage {
            role: msg.role.clone(),
            content,
        }
    }

    fn build_messages(request: &LLMRequest) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system_instruction {
            messages.push(Self::convert_message(&LLMMessage::system(system.clone())));
        }
        messages.extend(request.messages.iter().map(Self::convert_message));
        messages
    }
}

#[async_trait]
impl LLMAdapter for OpenRouterAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let body = ChatRequest {
            model: request.model.clone(),
            messages: Self::build_messages(request),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!(model = %request.model, messages = body.messages.len(), "Sending chat completion");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .header("X-Title", APP_TITLE)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::CapabilityUnavailable(format!("OpenRouter request failed: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();

            if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&error_text) {
                return Err(AppError::CapabilityUnavailable(format!(
                    "OpenRouter API error ({}): {}",
                    status, error_response.error.message
                )));
            }

            return Err(AppError::CapabilityUnavailable(format!(
                "OpenRouter API error ({}): {}",
                status, error_text
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::MalformedResponse(format!("Failed to parse OpenRouter response: {}", e)))?;

        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::MalformedResponse("OpenRouter returned no choices".to_string()))?;

        let content = choice.message.content.unwrap_or_default();
        if content.trim().is_empty() {
            return Err(AppError::MalformedResponse("OpenRouter returned empty content".to_string()));
        }

        let usage = chat_response
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(LLMResponse {
            content,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_image() -> LLMRequest {
        LLMRequest {
            model: "vision-model".to_string(),
            messages: vec![LLMMessage::user_with_base64_image("What is wrong?", "QUJD", "image/jpeg")],
            max_tokens: Some(512),
            temperature: Some(0.2),
            system_instruction: Some("You are a plant pathologist.".to_string()),
        }
    }

    #[test]
    fn test_build_messages_inlines_image_and_system() {
        let messages = OpenRouterAdapter::build_messages(&request_with_image());
        let json = serde_json::to_value(&messages).unwrap();

        assert_eq!(json[0]["role"], "system");
        assert_eq!(json[0]["content"], "You are a plant pathologist.");
        assert_eq!(json[1]["content"][0]["type"], "text");
        assert_eq!(json[1]["content"][1]["type"], "image_url");
        assert_eq!(json[1]["content"][1]["image_url"]["url"], "data:image/jpeg;base64,QUJD");
    }

    #[tokio::test]
    async fn test_chat_completion_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"content":"{\"ok\":true}"},"finish_reason":"stop"}],
                    "usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#,
            )
            .create_async()
            .await;

        let adapter = OpenRouterAdapter::new("test-key").with_base_url(&server.url());
        let response = adapter.create_chat_completion(&request_with_image()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "{\"ok\":true}");
        assert_eq!(response.usage.total_tokens, 15);
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .with_body(r#"{"error":{"message":"upstream overloaded"}}"#)
            .create_async()
            .await;

        let adapter = OpenRouterAdapter::new("test-key").with_base_url(&server.url());
        let err = adapter.create_chat_completion(&request_with_image()).await.unwrap_err();

        match err {
            AppError::CapabilityUnavailable(msg) => assert!(msg.contains("upstream overloaded")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_choices_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let adapter = OpenRouterAdapter::new("test-key").with_base_url(&server.url());
        let err = adapter.create_chat_completion(&request_with_image()).await.unwrap_err();
        assert!(matches!(err, AppError::MalformedResponse(_)));
    }
}
