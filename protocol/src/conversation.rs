//! Conversation items: the durable units of a session's transcript.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Completed,
    InProgress,
    Incomplete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    InputText {
        text: String,
    },
    InputAudio {
        audio: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        transcript: Option<String>,
    },
    OutputText {
        text: String,
    },
    OutputAudio {
        audio: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        transcript: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    Message {
        id: String,
        #[serde(default = "default_object_message")]
        object: String,
        status: ItemStatus,
        role: Role,
        content: Vec<ContentPart>,
    },
    FunctionCall {
        id: String,
        #[serde(default = "default_object_message")]
        object: String,
        status: ItemStatus,
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput {
        id: String,
        #[serde(default = "default_object_message")]
        object: String,
        status: ItemStatus,
        call_id: String,
        output: String,
    },
    #[serde(other)]
    Unknown,
}

fn default_object_message() -> String {
    "realtime.item".to_string()
}

impl ConversationItem {
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Message { id, .. }
            | Self::FunctionCall { id, .. }
            | Self::FunctionCallOutput { id, .. } => Some(id),
            Self::Unknown => None,
        }
    }

    pub fn status(&self) -> Option<ItemStatus> {
        match self {
            Self::Message { status, .. }
            | Self::FunctionCall { status, .. }
            | Self::FunctionCallOutput { status, .. } => Some(*status),
            Self::Unknown => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status(), Some(ItemStatus::Completed))
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            Self::Message { role, .. } => Some(*role),
            _ => None,
        }
    }

    pub fn is_function_call(&self) -> bool {
        matches!(self, Self::FunctionCall { .. })
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    pub fn user_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Message {
            id: id.into(),
            object: default_object_message(),
            status: ItemStatus::Completed,
            role: Role::User,
            content: vec![ContentPart::InputText { text: text.into() }],
        }
    }

    pub fn assistant_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Message {
            id: id.into(),
            object: default_object_message(),
            status: ItemStatus::Completed,
            role: Role::Assistant,
            content: vec![ContentPart::OutputText { text: text.into() }],
        }
    }

    pub fn function_call(
        id: impl Into<String>,
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self::FunctionCall {
            id: id.into(),
            object: default_object_message(),
            status: ItemStatus::Completed,
            call_id: call_id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    pub fn function_output(
        id: impl Into<String>,
        call_id: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self::FunctionCallOutput {
            id: id.into(),
            object: default_object_message(),
            status: ItemStatus::Completed,
            call_id: call_id.into(),
            output: output.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_round_trips() {
        let item = ConversationItem::user_text("item_1", "hello there");
        let json = serde_json::to_string(&item).unwrap();
        let back: ConversationItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id(), Some("item_1"));
        assert_eq!(back.role(), Some(Role::User));
    }

    #[test]
    fn unrecognized_type_decodes_as_unknown() {
        let json = r#"{"type":"mcp_call","id":"x"}"#;
        let item: ConversationItem = serde_json::from_str(json).unwrap();
        assert!(item.is_unknown());
    }

    #[test]
    fn function_call_flags() {
        let item = ConversationItem::function_call("item_2", "call_1", "get_weather", "{}");
        assert!(item.is_function_call());
        assert_eq!(item.status(), Some(ItemStatus::Completed));
    }
}
