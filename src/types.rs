// Type definitions shared by the capability clients and the pipeline

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMRequest {
    pub model: String,
    pub messages: Vec<LLMMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub system_instruction: Option<String>,
}

/// Content part for multimodal messages (text + inline images)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_base64")]
    ImageBase64 {
        base64: String,
        media_type: String, // e.g., "image/jpeg", "image/png"
    },
}

/// Message content - can be simple text or multimodal (text + images)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Multimodal(Vec<ContentPart>),
}

impl MessageContent {
    /// Get the text content (for simple text or first text part in multimodal)
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(s) => Some(s),
            MessageContent::Multimodal(parts) => parts.iter().find_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            }),
        }
    }

    pub fn has_images(&self) -> bool {
        match self {
            MessageContent::Text(_) => false,
            MessageContent::Multimodal(parts) => parts
                .iter()
                .any(|p| matches!(p, ContentPart::ImageBase64 { .. })),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMMessage {
    pub role: String, // "user", "assistant", "system"
    pub content: MessageContent,
}

impl LLMMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    /// Create a user message with base64 image (for vision models)
    pub fn user_with_base64_image(
        text: impl Into<String>,
        base64: impl Into<String>,
        media_type: impl Into<String>,
    ) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Multimodal(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageBase64 {
                    base64: base64.into(),
                    media_type: media_type.into(),
                },
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub finish_reason: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// User-visible error taxonomy label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InputRejected,
    CapabilityUnavailable,
    MalformedResponse,
    ValidationFailure,
    ExportFailure,
    Configuration,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorKind::InputRejected => "InputRejected",
            ErrorKind::CapabilityUnavailable => "CapabilityUnavailable",
            ErrorKind::MalformedResponse => "MalformedResponse",
            ErrorKind::ValidationFailure => "ValidationFailure",
            ErrorKind::ExportFailure => "ExportFailure",
            ErrorKind::Configuration => "Configuration",
        };
        f.write_str(label)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Image payload missing, corrupt or in an unsupported format
    #[error("Image rejected: {0}")]
    InputRejected(String),

    /// Network, timeout or auth failure on a capability call
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// Capability answered with text that does not parse into the expected structure
    #[error("Malformed capability response: {0}")]
    MalformedResponse(String),

    /// Assembled report violates the record invariant
    #[error("Report validation failed: {0}")]
    ValidationFailure(String),

    #[error("Export failed: {0}")]
    Export(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InputRejected(_) => ErrorKind::InputRejected,
            AppError::CapabilityUnavailable(_) => ErrorKind::CapabilityUnavailable,
            AppError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            AppError::ValidationFailure(_) => ErrorKind::ValidationFailure,
            AppError::Export(_) => ErrorKind::ExportFailure,
            AppError::Config(_) => ErrorKind::Configuration,
        }
    }

    /// Short human-readable message shown to the person who submitted the photo
    pub fn user_message(&self) -> String {
        match self {
            AppError::InputRejected(reason) => {
                format!("The uploaded image could not be used: {reason}")
            }
            AppError::CapabilityUnavailable(_) => {
                "The diagnosis service is currently unreachable. Please try again shortly.".to_string()
            }
            AppError::MalformedResponse(_) => {
                "The diagnosis service returned an unreadable answer.".to_string()
            }
            AppError::ValidationFailure(_) => {
                "The report could not be assembled due to an internal error.".to_string()
            }
            AppError::Export(_) => "The report could not be exported.".to_string(),
            AppError::Config(reason) => format!("The service is misconfigured: {reason}"),
        }
    }

    /// Whether a retry of the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::CapabilityUnavailable(_))
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            AppError::InputRejected("empty".into()).kind(),
            ErrorKind::InputRejected
        );
        assert_eq!(
            AppError::CapabilityUnavailable("timeout".into()).kind(),
            ErrorKind::CapabilityUnavailable
        );
        assert_eq!(ErrorKind::ValidationFailure.to_string(), "ValidationFailure");
    }

    #[test]
    fn test_only_unavailable_is_transient() {
        assert!(AppError::CapabilityUnavailable("503".into()).is_transient());
        assert!(!AppError::MalformedResponse("bad json".into()).is_transient());
        assert!(!AppError::InputRejected("empty".into()).is_transient());
    }

    #[test]
    fn test_multimodal_message() {
        let msg = LLMMessage::user_with_base64_image("look", "AAAA", "image/png");
        assert_eq!(msg.content.as_text(), Some("look"));
        assert!(msg.content.has_images());
        assert!(!LLMMessage::user("hi").content.has_images());
    }
}
