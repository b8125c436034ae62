//! Client → server events.

use serde::{Deserialize, Serialize};

use crate::conversation::ConversationItem;
use crate::response::ResponseConfig;
use crate::session::SessionConfigPatch;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeClientEvent {
    SessionUpdate {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        session: SessionConfigPatch,
    },
    InputAudioBufferAppend {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        audio: String,
    },
    InputAudioBufferCommit {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
    },
    InputAudioBufferClear {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
    },
    ConversationItemCreate {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        previous_item_id: Option<String>,
        item: ConversationItem,
    },
    ConversationItemTruncate {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        item_id: String,
        content_index: u32,
        audio_end_ms: u32,
    },
    ConversationItemDelete {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        item_id: String,
    },
    ResponseCreate {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response: Option<ResponseConfig>,
    },
    ResponseCancel {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        response_id: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl RealtimeClientEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionUpdate { .. } => "session.update",
            Self::InputAudioBufferAppend { .. } => "input_audio_buffer.append",
            Self::InputAudioBufferCommit { .. } => "input_audio_buffer.commit",
            Self::InputAudioBufferClear { .. } => "input_audio_buffer.clear",
            Self::ConversationItemCreate { .. } => "conversation.item.create",
            Self::ConversationItemTruncate { .. } => "conversation.item.truncate",
            Self::ConversationItemDelete { .. } => "conversation.item.delete",
            Self::ResponseCreate { .. } => "response.create",
            Self::ResponseCancel { .. } => "response.cancel",
            Self::Unknown => "unknown",
        }
    }

    pub fn event_id(&self) -> Option<&str> {
        match self {
            Self::SessionUpdate { event_id, .. }
            | Self::InputAudioBufferAppend { event_id, .. }
            | Self::InputAudioBufferCommit { event_id }
            | Self::InputAudioBufferClear { event_id }
            | Self::ConversationItemCreate { event_id, .. }
            | Self::ConversationItemTruncate { event_id, .. }
            | Self::ConversationItemDelete { event_id, .. }
            | Self::ResponseCreate { event_id, .. }
            | Self::ResponseCancel { event_id, .. } => event_id.as_deref(),
            Self::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Modality, SessionConfigPatch};

    #[test]
    fn session_update_round_trips() {
        let event = RealtimeClientEvent::SessionUpdate {
            event_id: Some("evt_1".into()),
            session: SessionConfigPatch {
                modalities: Some(vec![Modality::Text]),
                ..Default::default()
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"session.update\""));
        let back: RealtimeClientEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type(), "session.update");
        assert_eq!(back.event_id(), Some("evt_1"));
    }

    #[test]
    fn audio_append_minimal() {
        let json = r#"{"type":"input_audio_buffer.append","audio":"AAAA"}"#;
        let event: RealtimeClientEvent = serde_json::from_str(json).unwrap();
        match event {
            RealtimeClientEvent::InputAudioBufferAppend { audio, event_id } => {
                assert_eq!(audio, "AAAA");
                assert!(event_id.is_none());
            }
            _ => panic!("expected InputAudioBufferAppend"),
        }
    }

    #[test]
    fn unknown_event_type_does_not_fail_decode() {
        let json = r#"{"type":"output_audio_buffer.clear"}"#;
        let event: RealtimeClientEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type(), "unknown");
    }

    #[test]
    fn response_create_with_no_body() {
        let json = r#"{"type":"response.create"}"#;
        let event: RealtimeClientEvent = serde_json::from_str(json).unwrap();
        match event {
            RealtimeClientEvent::ResponseCreate { response, .. } => assert!(response.is_none()),
            _ => panic!("expected ResponseCreate"),
        }
    }
}
