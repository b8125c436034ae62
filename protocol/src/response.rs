//! The `Response` object: one in-flight or completed STT→LLM→TTS turn.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conversation::ConversationItem;
use crate::session::{MaxResponseOutputTokens, Modality, ToolChoice, ToolDefinition, Voice};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    InProgress,
    Completed,
    Cancelled,
    Incomplete,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseStatusDetails {
    Completed,
    Cancelled,
    Incomplete { reason: String },
    Failed { error: ResponseError },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputTokenDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputTokenDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseUsage {
    pub total_tokens: u32,
    pub input_tokens: u32,
    pub output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_token_details: Option<InputTokenDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_token_details: Option<OutputTokenDetails>,
}

/// Per-call overrides accepted by `response.create`, honored for the
/// duration of the one response without mutating the session's config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<Modality>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<Voice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_response_output_tokens: Option<MaxResponseOutputTokens>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ResponseConversation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseConversation {
    Auto(AutoTag),
    None(NoneTag),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoTag {
    Auto,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoneTag {
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(default = "default_object_response")]
    pub object: String,
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_details: Option<ResponseStatusDetails>,
    pub output: Vec<ConversationItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<ResponseUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

fn default_object_response() -> String {
    "realtime.response".to_string()
}

impl Response {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object: default_object_response(),
            status: ResponseStatus::InProgress,
            status_details: None,
            output: Vec::new(),
            usage: None,
            metadata: None,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == ResponseStatus::InProgress
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_in_progress()
    }

    pub fn function_calls(&self) -> impl Iterator<Item = &ConversationItem> {
        self.output.iter().filter(|item| item.is_function_call())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_round_trips_in_progress() {
        let response = Response::new("resp_1");
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("status_details"));
        let back: Response = serde_json::from_str(&json).unwrap();
        assert!(back.is_in_progress());
    }

    #[test]
    fn failed_status_details_round_trip() {
        let details = ResponseStatusDetails::Failed {
            error: ResponseError {
                error_type: "upstream_timeout".into(),
                message: "llm timed out".into(),
            },
        };
        let json = serde_json::to_string(&details).unwrap();
        let back: ResponseStatusDetails = serde_json::from_str(&json).unwrap();
        match back {
            ResponseStatusDetails::Failed { error } => assert_eq!(error.error_type, "upstream_timeout"),
            _ => panic!("expected Failed"),
        }
    }
}
