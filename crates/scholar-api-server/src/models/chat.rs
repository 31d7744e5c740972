use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type SessionId = String;

// ===== CORE MESSAGE MODEL =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Message content on the chat-completion wire: either a plain string or a
/// multimodal part list (text part + image part). Matches the
/// OpenAI-compatible request shape, so it serializes untagged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(content.into()),
        }
    }

    /// User turn carrying a question plus an image as a base64 data URI.
    pub fn user_with_image(content: impl Into<String>, data_uri: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: content.into(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: data_uri.into(),
                    },
                },
            ]),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Plain-text view of the content, if it is not multimodal.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(text) => Some(text),
            MessageContent::Parts(_) => None,
        }
    }

    pub fn is_multimodal(&self) -> bool {
        matches!(self.content, MessageContent::Parts(_))
    }
}

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub session_id: Option<SessionId>,
    pub message: String,
    #[serde(default)]
    pub image: Option<ImageUpload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageUpload {
    pub file_name: String,
    pub data_base64: String,
}

// ===== RESPONSE MODELS =====

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub session_id: SessionId,
    pub reply: String,
    pub turns: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub session_id: SessionId,
    pub status: UploadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub chars_extracted: usize,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Extracted,
    Empty,
    Ignored,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: SessionId,
    pub messages: Vec<ChatMessage>,
}
