//! Server → client events.

use serde::{Deserialize, Serialize};

use crate::conversation::ConversationItem;
use crate::response::{Response, ResponseUsage};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    InvalidItem,
    ItemNotFound,
    ItemReferenced,
    ResponseAlreadyActive,
    UnsupportedIntent,
    InputAudioBufferOverrun,
    UpstreamUnavailable,
    UpstreamTimeout,
    RateLimited,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidItem => "invalid_item",
            Self::ItemNotFound => "item_not_found",
            Self::ItemReferenced => "item_referenced",
            Self::ResponseAlreadyActive => "response_already_active",
            Self::UnsupportedIntent => "unsupported_intent",
            Self::InputAudioBufferOverrun => "input_audio_buffer_overrun",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::UpstreamTimeout => "upstream_timeout",
            Self::RateLimited => "rate_limited",
            Self::Internal => "internal",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error_type: "error".to_string(),
            code: kind.as_str().to_string(),
            message: message.into(),
            param: None,
            event_id: None,
        }
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default = "default_object_conversation")]
    pub object: String,
}

fn default_object_conversation() -> String {
    "realtime.conversation".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeServerEvent {
    Error {
        event_id: String,
        error: ApiError,
    },
    SessionCreated {
        event_id: String,
        session: Session,
    },
    SessionUpdated {
        event_id: String,
        session: Session,
    },
    ConversationCreated {
        event_id: String,
        conversation: Conversation,
    },
    ConversationItemCreated {
        event_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        previous_item_id: Option<String>,
        item: ConversationItem,
    },
    ConversationItemInputAudioTranscriptionCompleted {
        event_id: String,
        item_id: String,
        content_index: u32,
        transcript: String,
    },
    ConversationItemInputAudioTranscriptionFailed {
        event_id: String,
        item_id: String,
        content_index: u32,
        error: ApiError,
    },
    ConversationItemTruncated {
        event_id: String,
        item_id: String,
        content_index: u32,
        audio_end_ms: u32,
    },
    ConversationItemDeleted {
        event_id: String,
        item_id: String,
    },
    InputAudioBufferCommitted {
        event_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        previous_item_id: Option<String>,
        item_id: String,
    },
    InputAudioBufferCleared {
        event_id: String,
    },
    InputAudioBufferSpeechStarted {
        event_id: String,
        audio_start_ms: u32,
        item_id: String,
    },
    InputAudioBufferSpeechStopped {
        event_id: String,
        audio_end_ms: u32,
        item_id: String,
    },
    ResponseCreated {
        event_id: String,
        response: Response,
    },
    ResponseDone {
        event_id: String,
        response: Response,
    },
    ResponseCancelled {
        event_id: String,
        response: Response,
    },
    ResponseFailed {
        event_id: String,
        response: Response,
    },
    ResponseOutputItemAdded {
        event_id: String,
        response_id: String,
        output_index: u32,
        item: ConversationItem,
    },
    ResponseOutputItemDone {
        event_id: String,
        response_id: String,
        output_index: u32,
        item: ConversationItem,
    },
    ResponseContentPartAdded {
        event_id: String,
        response_id: String,
        item_id: String,
        output_index: u32,
        content_index: u32,
    },
    ResponseContentPartDone {
        event_id: String,
        response_id: String,
        item_id: String,
        output_index: u32,
        content_index: u32,
    },
    ResponseTextDelta {
        event_id: String,
        response_id: String,
        item_id: String,
        output_index: u32,
        content_index: u32,
        delta: String,
    },
    ResponseTextDone {
        event_id: String,
        response_id: String,
        item_id: String,
        output_index: u32,
        content_index: u32,
        text: String,
    },
    ResponseAudioTranscriptDelta {
        event_id: String,
        response_id: String,
        item_id: String,
        output_index: u32,
        content_index: u32,
        delta: String,
    },
    ResponseAudioTranscriptDone {
        event_id: String,
        response_id: String,
        item_id: String,
        output_index: u32,
        content_index: u32,
        transcript: String,
    },
    ResponseAudioDelta {
        event_id: String,
        response_id: String,
        item_id: String,
        output_index: u32,
        content_index: u32,
        delta: String,
    },
    ResponseAudioDone {
        event_id: String,
        response_id: String,
        item_id: String,
        output_index: u32,
        content_index: u32,
    },
    ResponseFunctionCallArgumentsDelta {
        event_id: String,
        response_id: String,
        item_id: String,
        output_index: u32,
        call_id: String,
        delta: String,
    },
    ResponseFunctionCallArgumentsDone {
        event_id: String,
        response_id: String,
        item_id: String,
        output_index: u32,
        call_id: String,
        arguments: String,
    },
    #[serde(other)]
    Unknown,
}

impl RealtimeServerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Error { .. } => "error",
            Self::SessionCreated { .. } => "session.created",
            Self::SessionUpdated { .. } => "session.updated",
            Self::ConversationCreated { .. } => "conversation.created",
            Self::ConversationItemCreated { .. } => "conversation.item.created",
            Self::ConversationItemInputAudioTranscriptionCompleted { .. } => {
                "conversation.item.input_audio_transcription.completed"
            }
            Self::ConversationItemInputAudioTranscriptionFailed { .. } => {
                "conversation.item.input_audio_transcription.failed"
            }
            Self::ConversationItemTruncated { .. } => "conversation.item.truncated",
            Self::ConversationItemDeleted { .. } => "conversation.item.deleted",
            Self::InputAudioBufferCommitted { .. } => "input_audio_buffer.committed",
            Self::InputAudioBufferCleared { .. } => "input_audio_buffer.cleared",
            Self::InputAudioBufferSpeechStarted { .. } => "input_audio_buffer.speech_started",
            Self::InputAudioBufferSpeechStopped { .. } => "input_audio_buffer.speech_stopped",
            Self::ResponseCreated { .. } => "response.created",
            Self::ResponseDone { .. } => "response.done",
            Self::ResponseCancelled { .. } => "response.cancelled",
            Self::ResponseFailed { .. } => "response.failed",
            Self::ResponseOutputItemAdded { .. } => "response.output_item.added",
            Self::ResponseOutputItemDone { .. } => "response.output_item.done",
            Self::ResponseContentPartAdded { .. } => "response.content_part.added",
            Self::ResponseContentPartDone { .. } => "response.content_part.done",
            Self::ResponseTextDelta { .. } => "response.text.delta",
            Self::ResponseTextDone { .. } => "response.text.done",
            Self::ResponseAudioTranscriptDelta { .. } => "response.audio_transcript.delta",
            Self::ResponseAudioTranscriptDone { .. } => "response.audio_transcript.done",
            Self::ResponseAudioDelta { .. } => "response.audio.delta",
            Self::ResponseAudioDone { .. } => "response.audio.done",
            Self::ResponseFunctionCallArgumentsDelta { .. } => {
                "response.function_call_arguments.delta"
            }
            Self::ResponseFunctionCallArgumentsDone { .. } => {
                "response.function_call_arguments.done"
            }
            Self::Unknown => "unknown",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn as_error(&self) -> Option<&ApiError> {
        match self {
            Self::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn is_delta_event(&self) -> bool {
        self.event_type().ends_with(".delta")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionConfig;

    #[test]
    fn error_event_round_trips() {
        let event = RealtimeServerEvent::Error {
            event_id: "evt_1".into(),
            error: ApiError::new(ErrorKind::InvalidRequest, "bad field"),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: RealtimeServerEvent = serde_json::from_str(&json).unwrap();
        assert!(back.is_error());
        assert_eq!(back.as_error().unwrap().code, "invalid_request");
    }

    #[test]
    fn session_created_round_trips() {
        let session = Session::new("sess_1", "gateway-llm", SessionConfig::default());
        let event = RealtimeServerEvent::SessionCreated {
            event_id: "evt_2".into(),
            session,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"session.created\""));
    }

    #[test]
    fn response_cancelled_and_failed_are_distinct_from_done() {
        use crate::response::Response;

        let cancelled = RealtimeServerEvent::ResponseCancelled {
            event_id: "evt_4".into(),
            response: Response::new("resp_1"),
        };
        assert_eq!(cancelled.event_type(), "response.cancelled");

        let failed = RealtimeServerEvent::ResponseFailed {
            event_id: "evt_5".into(),
            response: Response::new("resp_2"),
        };
        assert_eq!(failed.event_type(), "response.failed");

        let json = serde_json::to_string(&cancelled).unwrap();
        assert!(json.contains("\"type\":\"response.cancelled\""));
    }

    #[test]
    fn delta_events_are_flagged() {
        let event = RealtimeServerEvent::ResponseTextDelta {
            event_id: "evt_3".into(),
            response_id: "resp_1".into(),
            item_id: "item_1".into(),
            output_index: 0,
            content_index: 0,
            delta: "hi".into(),
        };
        assert!(event.is_delta_event());
    }
}
