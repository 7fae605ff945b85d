//! OpenAI-compatible API type definitions

use serde::{Deserialize, Serialize};

/// Chat completion request as LM Studio expects it
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: i64,
    pub stream: bool,
}

/// Chat message
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Models list response from /v1/models
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelsResponse {
    pub data: Vec<ModelInfo>,
}

/// Model information
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub owned_by: Option<String>,
}

/// Extract `choices[0].delta.content` from a streaming chunk
///
/// Returns `None` when the chunk carries no text (role-only deltas, finish
/// chunks, keep-alives with no choices).
pub fn delta_content(chunk: &serde_json::Value) -> Option<&str> {
    chunk
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .filter(|content| !content.is_empty())
}
