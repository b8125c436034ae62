//! The Conversation Log: an ordered, append-only record of conversation
//! items with in-place status transitions (spec §3, §4.2).

use std::collections::{HashMap, HashSet};

use base64::Engine;
use conversation_protocol::conversation::{ContentPart, ConversationItem, ItemStatus, Role};

use crate::collaborators::ChatMessage;
use crate::error::GatewayError;

/// PCM is fixed at 16-bit mono, 24 kHz (spec §3) — 2 bytes per sample,
/// 48,000 bytes per second.
const BYTES_PER_MS: f64 = 48.0;

pub struct ConversationLog {
    items: Vec<ConversationItem>,
    index: HashMap<String, usize>,
    function_call_ids: HashSet<String>,
    next_seq: u64,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
            function_call_ids: HashSet::new(),
            next_seq: 0,
        }
    }

    fn next_item_id(&mut self) -> String {
        self.next_seq += 1;
        format!("item_{:08x}", self.next_seq)
    }

    pub fn get(&self, item_id: &str) -> Option<&ConversationItem> {
        self.index.get(item_id).and_then(|&idx| self.items.get(idx))
    }

    /// Allocates an item id without inserting anything — used to pre-assign
    /// the id a server-VAD `speech_started` event advertises, ahead of the
    /// eventual `commit` that actually creates the item.
    pub fn reserve_item_id(&mut self) -> String {
        self.next_item_id()
    }

    pub fn last_item_id(&self) -> Option<String> {
        self.items.last().and_then(|item| item.id()).map(str::to_string)
    }

    pub fn item_ids(&self) -> HashSet<String> {
        self.index.keys().cloned().collect()
    }

    /// Fills in a transcript produced by speech-to-text after the fact, on
    /// the `input_audio` content part of a message item.
    pub fn set_input_audio_transcript(&mut self, item_id: &str, transcript: &str) -> bool {
        let Some(&idx) = self.index.get(item_id) else {
            return false;
        };
        if let ConversationItem::Message { content, .. } = &mut self.items[idx] {
            if let Some(ContentPart::InputAudio { transcript: slot, .. }) = content.first_mut() {
                *slot = Some(transcript.to_string());
                return true;
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Appends an item, assigning an id if the caller left one blank.
    /// Validates the shape rules from spec §3.
    pub fn append(&mut self, mut item: ConversationItem) -> Result<&ConversationItem, GatewayError> {
        self.validate(&item)?;

        let id = match item.id() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self.next_item_id(),
        };
        set_item_id(&mut item, id.clone());

        if self.index.contains_key(&id) {
            return Err(GatewayError::InvalidItem(format!(
                "item id {id} already exists in this session"
            )));
        }

        if let ConversationItem::FunctionCall { call_id, .. } = &item {
            self.function_call_ids.insert(call_id.clone());
        }

        let idx = self.items.len();
        self.items.push(item);
        self.index.insert(id, idx);
        Ok(&self.items[idx])
    }

    fn validate(&self, item: &ConversationItem) -> Result<(), GatewayError> {
        match item {
            ConversationItem::Message { content, .. } => {
                if content.len() != 1 {
                    return Err(GatewayError::InvalidItem(format!(
                        "message items must carry exactly one content part, got {}",
                        content.len()
                    )));
                }
            }
            ConversationItem::FunctionCallOutput { call_id, .. } => {
                if !self.function_call_ids.contains(call_id) {
                    return Err(GatewayError::InvalidItem(format!(
                        "function_call_output references unknown call_id {call_id}"
                    )));
                }
            }
            ConversationItem::FunctionCall { .. } | ConversationItem::Unknown => {}
        }
        Ok(())
    }

    /// Shortens an assistant audio content part to reflect that playback
    /// was cut short at `audio_end_ms`, truncating the transcript to the
    /// proportional prefix.
    pub fn truncate(
        &mut self,
        item_id: &str,
        content_index: usize,
        audio_end_ms: u32,
    ) -> Result<(), GatewayError> {
        let idx = *self
            .index
            .get(item_id)
            .ok_or_else(|| GatewayError::ItemNotFound(item_id.to_string()))?;

        let ConversationItem::Message { content, .. } = &mut self.items[idx] else {
            return Err(GatewayError::InvalidItem(format!(
                "item {item_id} is not a message"
            )));
        };

        let part = content
            .get_mut(content_index)
            .ok_or_else(|| GatewayError::InvalidItem(format!(
                "item {item_id} has no content part at index {content_index}"
            )))?;

        truncate_audio_part(part, audio_end_ms)
    }

    /// Removes an item. Rejected if `referenced` (the item ids the active
    /// response depends on) names it.
    pub fn delete(
        &mut self,
        item_id: &str,
        referenced: &HashSet<String>,
    ) -> Result<ConversationItem, GatewayError> {
        if referenced.contains(item_id) {
            return Err(GatewayError::ItemReferenced(item_id.to_string()));
        }
        let idx = *self
            .index
            .get(item_id)
            .ok_or_else(|| GatewayError::ItemNotFound(item_id.to_string()))?;

        let removed = self.items.remove(idx);
        self.index.remove(item_id);
        for (_, slot) in self.index.iter_mut() {
            if *slot > idx {
                *slot -= 1;
            }
        }
        Ok(removed)
    }

    /// Pure mapping from the completed-item subsequence of the log to the
    /// chat message list handed to the LLM (spec §4.2, §9). Runs of
    /// `function_call` items coalesce into one assistant turn.
    pub fn project_history(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::new();
        let mut pending_tool_calls = Vec::new();

        for item in &self.items {
            if !item.is_completed() {
                continue;
            }

            if item.is_function_call() {
                if let ConversationItem::FunctionCall { call_id, name, arguments, .. } = item {
                    pending_tool_calls.push(crate::collaborators::ToolCallRequest {
                        call_id: call_id.clone(),
                        name: name.clone(),
                        arguments: arguments.clone(),
                    });
                }
                continue;
            }

            if !pending_tool_calls.is_empty() {
                messages.push(ChatMessage::assistant_tool_calls(std::mem::take(
                    &mut pending_tool_calls,
                )));
            }

            if let Some(message) = Self::project_item(item) {
                messages.push(message);
            }
        }

        if !pending_tool_calls.is_empty() {
            messages.push(ChatMessage::assistant_tool_calls(pending_tool_calls));
        }

        messages
    }

    fn project_item(item: &ConversationItem) -> Option<ChatMessage> {
        match item {
            ConversationItem::Message { role, content, .. } => {
                let part = content.first()?;
                let text = match part {
                    ContentPart::InputText { text } => Some(text.clone()),
                    ContentPart::OutputText { text } => Some(text.clone()),
                    ContentPart::InputAudio { transcript, .. }
                    | ContentPart::OutputAudio { transcript, .. } => transcript.clone(),
                    ContentPart::Unknown => None,
                };
                let text = match text {
                    Some(t) => t,
                    None => {
                        tracing::warn!(item_id = item.id(), "dropping input_audio item without transcript from projection");
                        return None;
                    }
                };
                Some(match role {
                    Role::User => ChatMessage::user(text),
                    Role::Assistant => ChatMessage::assistant(text),
                    Role::System => ChatMessage::system(text),
                })
            }
            ConversationItem::FunctionCallOutput { call_id, output, .. } => {
                Some(ChatMessage::tool(call_id.clone(), output.clone()))
            }
            ConversationItem::FunctionCall { .. } | ConversationItem::Unknown => None,
        }
    }
}

impl Default for ConversationLog {
    fn default() -> Self {
        Self::new()
    }
}

fn set_item_id(item: &mut ConversationItem, id: String) {
    match item {
        ConversationItem::Message { id: slot, .. }
        | ConversationItem::FunctionCall { id: slot, .. }
        | ConversationItem::FunctionCallOutput { id: slot, .. } => *slot = id,
        ConversationItem::Unknown => {}
    }
}

fn truncate_audio_part(part: &mut ContentPart, audio_end_ms: u32) -> Result<(), GatewayError> {
    let ContentPart::OutputAudio { audio, transcript } = part else {
        return Err(GatewayError::InvalidItem(
            "truncate only applies to output_audio content parts".to_string(),
        ));
    };

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(audio.as_bytes())
        .map_err(|e| GatewayError::InvalidItem(format!("audio content is not valid base64: {e}")))?;

    let total_ms = (decoded.len() as f64 / BYTES_PER_MS).max(1.0);
    let ratio = (audio_end_ms as f64 / total_ms).clamp(0.0, 1.0);

    let kept_bytes = ((decoded.len() as f64 * ratio) as usize / 2) * 2;
    *audio = base64::engine::general_purpose::STANDARD.encode(&decoded[..kept_bytes]);

    if let Some(text) = transcript {
        let kept_chars = ((text.chars().count() as f64) * ratio) as usize;
        *text = text.chars().take(kept_chars).collect();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64_silence(ms: u32) -> String {
        let bytes = vec![0u8; (ms as f64 * BYTES_PER_MS) as usize];
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn append_assigns_id_and_rejects_multi_part_message() {
        let mut log = ConversationLog::new();
        let item = ConversationItem::Message {
            id: String::new(),
            object: "realtime.item".into(),
            status: ItemStatus::Completed,
            role: Role::User,
            content: vec![
                ContentPart::InputText { text: "a".into() },
                ContentPart::InputText { text: "b".into() },
            ],
        };
        assert!(log.append(item).is_err());
    }

    #[test]
    fn function_call_output_requires_known_call_id() {
        let mut log = ConversationLog::new();
        let output = ConversationItem::function_output("item_1", "call_unknown", "42");
        assert!(matches!(log.append(output), Err(GatewayError::InvalidItem(_))));

        log.append(ConversationItem::function_call("item_2", "call_1", "get_time", "{}"))
            .unwrap();
        let output = ConversationItem::function_output("item_3", "call_1", "12:00");
        assert!(log.append(output).is_ok());
    }

    #[test]
    fn project_history_coalesces_consecutive_tool_calls() {
        let mut log = ConversationLog::new();
        log.append(ConversationItem::user_text("item_1", "what time is it, and what's the weather?"))
            .unwrap();
        log.append(ConversationItem::function_call("item_2", "call_1", "get_time", "{}"))
            .unwrap();
        log.append(ConversationItem::function_call("item_3", "call_2", "get_weather", "{}"))
            .unwrap();
        log.append(ConversationItem::function_output("item_4", "call_1", "12:00"))
            .unwrap();

        let projected = log.project_history();
        assert_eq!(projected.len(), 3);
        assert_eq!(projected[1].tool_calls.len(), 2);
        assert_eq!(projected[1].tool_calls[0].call_id, "call_1");
        assert_eq!(projected[1].tool_calls[1].call_id, "call_2");
    }

    #[test]
    fn project_history_skips_incomplete_items() {
        let mut log = ConversationLog::new();
        log.append(ConversationItem::Message {
            id: String::new(),
            object: "realtime.item".into(),
            status: ItemStatus::InProgress,
            role: Role::Assistant,
            content: vec![ContentPart::OutputText { text: "partial".into() }],
        })
        .unwrap();
        assert!(log.project_history().is_empty());
    }

    #[test]
    fn project_history_drops_audio_without_transcript() {
        let mut log = ConversationLog::new();
        log.append(ConversationItem::Message {
            id: String::new(),
            object: "realtime.item".into(),
            status: ItemStatus::Completed,
            role: Role::User,
            content: vec![ContentPart::InputAudio {
                audio: b64_silence(10),
                transcript: None,
            }],
        })
        .unwrap();
        assert!(log.project_history().is_empty());
    }

    #[test]
    fn delete_rejects_referenced_item() {
        let mut log = ConversationLog::new();
        log.append(ConversationItem::user_text("item_1", "hi")).unwrap();
        let mut referenced = HashSet::new();
        referenced.insert("item_1".to_string());
        assert!(matches!(
            log.delete("item_1", &referenced),
            Err(GatewayError::ItemReferenced(_))
        ));
        assert!(log.delete("item_1", &HashSet::new()).is_ok());
    }

    #[test]
    fn truncate_shortens_transcript_proportionally() {
        let mut log = ConversationLog::new();
        log.append(ConversationItem::Message {
            id: String::new(),
            object: "realtime.item".into(),
            status: ItemStatus::Completed,
            role: Role::Assistant,
            content: vec![ContentPart::OutputAudio {
                audio: b64_silence(1000),
                transcript: Some("hello world".into()),
            }],
        })
        .unwrap();
        let id = log.items[0].id().unwrap().to_string();
        log.truncate(&id, 0, 500).unwrap();
        let ConversationItem::Message { content, .. } = log.get(&id).unwrap() else {
            panic!("expected message");
        };
        let ContentPart::OutputAudio { transcript, .. } = &content[0] else {
            panic!("expected output_audio");
        };
        assert!(transcript.as_deref().unwrap().len() < "hello world".len());
    }
}
