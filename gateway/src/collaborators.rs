//! External collaborator contracts (§6): speech-to-text, chat-completion,
//! text-to-speech, and voice-activity detection.
//!
//! These are trait objects, not concrete clients — deliberately so tests can
//! substitute deterministic fakes instead of mocking an HTTP client. None of
//! the implementations live in this crate; model download/caching, auth to
//! the upstream provider, and the actual inference are out of scope.

use async_trait::async_trait;
use conversation_protocol::response::ResponseUsage;
use conversation_protocol::session::{AudioFormat, ToolChoice, ToolDefinition, Voice};
use futures::stream::BoxStream;

use crate::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub name: String,
    pub arguments: String,
}

/// A single turn in the history handed to the chat-completion backend —
/// the output of [`crate::conversation::ConversationLog::project_history`].
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant_tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: None,
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// The request built by the Response Orchestrator at the start of a turn
/// (spec §4.4 step 2).
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model_id: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: Option<ToolChoice>,
    pub want_audio: bool,
    pub voice: Voice,
    pub audio_format: AudioFormat,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone)]
pub enum ChatDelta {
    Text(String),
    /// Raw PCM produced directly by an audio-native backend.
    Audio(Vec<u8>),
    ToolCall {
        call_id: String,
        name: Option<String>,
        arguments_delta: String,
    },
    Usage(ResponseUsage),
}

#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> Result<BoxStream<'static, Result<ChatDelta, GatewayError>>, GatewayError>;
}

#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(
        &self,
        pcm: &[u8],
        sample_rate: u32,
        model_id: &str,
        language: Option<&str>,
    ) -> Result<String, GatewayError>;
}

#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: Voice,
        format: AudioFormat,
    ) -> Result<BoxStream<'static, Result<Vec<u8>, GatewayError>>, GatewayError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEdge {
    SpeechStarted { offset: usize },
    SpeechStopped { offset: usize },
}

/// Stateful, incremental: each `feed` call reports the edges detected
/// within that chunk of audio, relative to the buffer's absolute sample
/// offset the caller passes in. This lets the Input-Audio Buffer drive
/// the detector synchronously on every append rather than juggling a
/// long-lived background stream.
#[async_trait]
pub trait VoiceActivityDetector: Send + Sync {
    async fn feed(
        &mut self,
        pcm: &[u8],
        sample_rate: u32,
        base_offset: usize,
    ) -> Result<Vec<VadEdge>, GatewayError>;
}
