//! The Response Orchestrator (spec §4.4): per-response task that builds
//! history, drives the LLM stream, splits deltas into text/audio/tool-call
//! channels, feeds text to TTS, and emits progress events.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use conversation_protocol::conversation::{ContentPart, ConversationItem, ItemStatus, Role};
use conversation_protocol::response::{Response, ResponseStatus, ResponseStatusDetails, ResponseUsage};
use conversation_protocol::server_events::RealtimeServerEvent;
use conversation_protocol::session::{AudioFormat, Voice};
use futures_util::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::collaborators::{ChatCompletion, ChatDelta, ChatRequest, TextToSpeech};
use crate::error::GatewayError;
use crate::signal::{ResponseOutcome, SessionSignal};

/// 16-bit mono PCM @ 24 kHz, 20 ms frames.
const FRAME_BYTES: usize = 960;
const DEFAULT_SENTENCE_FLUSH_CHARS: usize = 120;

pub struct ResponseDeadlines {
    pub llm_idle: Duration,
    pub tts: Duration,
}

pub struct ResponseOrchestrator {
    pub llm: Arc<dyn ChatCompletion>,
    pub tts: Option<Arc<dyn TextToSpeech>>,
    pub deadlines: ResponseDeadlines,
}

struct PendingToolCall {
    call_id: String,
    name: String,
    arguments: String,
}

impl ResponseOrchestrator {
    /// Spawns the per-response task and returns immediately; all output
    /// flows back through `tx` as [`SessionSignal`]s.
    pub fn spawn(
        self: Arc<Self>,
        response_id: String,
        request: ChatRequest,
        want_audio: bool,
        voice: Voice,
        audio_format: AudioFormat,
        tx: UnboundedSender<SessionSignal>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(response_id, request, want_audio, voice, audio_format, tx, cancel)
                .await;
        })
    }

    async fn run(
        &self,
        response_id: String,
        request: ChatRequest,
        want_audio: bool,
        voice: Voice,
        audio_format: AudioFormat,
        tx: UnboundedSender<SessionSignal>,
        cancel: CancellationToken,
    ) {
        let emit = |event: RealtimeServerEvent| {
            let _ = tx.send(SessionSignal::ResponseEvent(event));
        };

        emit(RealtimeServerEvent::ResponseCreated {
            event_id: crate::ids::new_event_id(),
            response: Response::new(response_id.clone()),
        });

        let item_id = format!("item_{response_id}_msg");
        let mut text_transcript = String::new();
        let mut tts_buffer = String::new();
        let mut audio_bytes: Vec<u8> = Vec::new();
        let mut tool_calls: Vec<PendingToolCall> = Vec::new();
        let mut usage: Option<ResponseUsage> = None;
        let mut message_item_opened = false;
        let mut tool_items_opened: Vec<String> = Vec::new();

        let stream = match self.llm.stream_chat(request).await {
            Ok(stream) => stream,
            Err(err) => {
                self.finish_failed(
                    &response_id,
                    &item_id,
                    message_item_opened,
                    &text_transcript,
                    &audio_bytes,
                    want_audio,
                    &tool_calls,
                    err,
                    &tx,
                );
                return;
            }
        };
        let mut stream = stream;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.finish_cancelled(
                        &response_id,
                        &item_id,
                        message_item_opened,
                        &text_transcript,
                        &audio_bytes,
                        want_audio,
                        &tool_calls,
                        &tx,
                    );
                    return;
                }
                delta = tokio::time::timeout(self.deadlines.llm_idle, stream.next()) => delta,
            };

            let delta = match next {
                Ok(Some(Ok(delta))) => delta,
                Ok(Some(Err(err))) => {
                    self.finish_failed(
                        &response_id,
                        &item_id,
                        message_item_opened,
                        &text_transcript,
                        &audio_bytes,
                        want_audio,
                        &tool_calls,
                        err,
                        &tx,
                    );
                    return;
                }
                Ok(None) => break,
                Err(_elapsed) => {
                    self.finish_failed(
                        &response_id,
                        &item_id,
                        message_item_opened,
                        &text_transcript,
                        &audio_bytes,
                        want_audio,
                        &tool_calls,
                        GatewayError::UpstreamTimeout("llm stream idle timeout".to_string()),
                        &tx,
                    );
                    return;
                }
            };

            match delta {
                ChatDelta::Text(piece) => {
                    if !message_item_opened {
                        message_item_opened = true;
                        emit(RealtimeServerEvent::ResponseOutputItemAdded {
                            event_id: crate::ids::new_event_id(),
                            response_id: response_id.clone(),
                            output_index: 0,
                            item: placeholder_message_item(&item_id, want_audio),
                        });
                        emit(RealtimeServerEvent::ResponseContentPartAdded {
                            event_id: crate::ids::new_event_id(),
                            response_id: response_id.clone(),
                            item_id: item_id.clone(),
                            output_index: 0,
                            content_index: 0,
                        });
                    }
                    text_transcript.push_str(&piece);

                    if want_audio {
                        emit(RealtimeServerEvent::ResponseAudioTranscriptDelta {
                            event_id: crate::ids::new_event_id(),
                            response_id: response_id.clone(),
                            item_id: item_id.clone(),
                            output_index: 0,
                            content_index: 0,
                            delta: piece.clone(),
                        });
                        if let Some(tts) = &self.tts {
                            tts_buffer.push_str(&piece);
                            if should_flush(&tts_buffer) {
                                let chunk = std::mem::take(&mut tts_buffer);
                                if let Err(err) = self
                                    .synthesize_and_emit(
                                        tts.as_ref(),
                                        &chunk,
                                        voice,
                                        audio_format,
                                        &response_id,
                                        &item_id,
                                        &mut audio_bytes,
                                        &cancel,
                                        &tx,
                                    )
                                    .await
                                {
                                    self.finish_failed(
                                        &response_id,
                                        &item_id,
                                        message_item_opened,
                                        &text_transcript,
                                        &audio_bytes,
                                        want_audio,
                                        &tool_calls,
                                        err,
                                        &tx,
                                    );
                                    return;
                                }
                            }
                        }
                    } else {
                        emit(RealtimeServerEvent::ResponseTextDelta {
                            event_id: crate::ids::new_event_id(),
                            response_id: response_id.clone(),
                            item_id: item_id.clone(),
                            output_index: 0,
                            content_index: 0,
                            delta: piece,
                        });
                    }
                }
                ChatDelta::Audio(chunk) => {
                    if !message_item_opened {
                        message_item_opened = true;
                        emit(RealtimeServerEvent::ResponseOutputItemAdded {
                            event_id: crate::ids::new_event_id(),
                            response_id: response_id.clone(),
                            output_index: 0,
                            item: placeholder_message_item(&item_id, true),
                        });
                        emit(RealtimeServerEvent::ResponseContentPartAdded {
                            event_id: crate::ids::new_event_id(),
                            response_id: response_id.clone(),
                            item_id: item_id.clone(),
                            output_index: 0,
                            content_index: 0,
                        });
                    }
                    emit_audio_frames(&chunk, &response_id, &item_id, &emit);
                    audio_bytes.extend_from_slice(&chunk);
                }
                ChatDelta::ToolCall { call_id, name, arguments_delta } => {
                    let idx = tool_calls.iter().position(|t| t.call_id == call_id);
                    let idx = match idx {
                        Some(idx) => idx,
                        None => {
                            tool_items_opened.push(call_id.clone());
                            let output_index = tool_items_opened.len() as u32;
                            emit(RealtimeServerEvent::ResponseOutputItemAdded {
                                event_id: crate::ids::new_event_id(),
                                response_id: response_id.clone(),
                                output_index,
                                item: ConversationItem::function_call(
                                    format!("item_{response_id}_call_{call_id}"),
                                    call_id.clone(),
                                    name.clone().unwrap_or_default(),
                                    String::new(),
                                ),
                            });
                            tool_calls.push(PendingToolCall {
                                call_id: call_id.clone(),
                                name: name.clone().unwrap_or_default(),
                                arguments: String::new(),
                            });
                            tool_calls.len() - 1
                        }
                    };
                    if let Some(name) = name {
                        if !name.is_empty() {
                            tool_calls[idx].name = name;
                        }
                    }
                    tool_calls[idx].arguments.push_str(&arguments_delta);
                    emit(RealtimeServerEvent::ResponseFunctionCallArgumentsDelta {
                        event_id: crate::ids::new_event_id(),
                        response_id: response_id.clone(),
                        item_id: format!("item_{response_id}_call_{call_id}"),
                        output_index: (idx + 1) as u32,
                        call_id,
                        delta: arguments_delta,
                    });
                }
                ChatDelta::Usage(u) => usage = Some(u),
            }
        }

        if want_audio {
            if let Some(tts) = &self.tts {
                if !tts_buffer.is_empty() {
                    let chunk = std::mem::take(&mut tts_buffer);
                    if let Err(err) = self
                        .synthesize_and_emit(
                            tts.as_ref(),
                            &chunk,
                            voice,
                            audio_format,
                            &response_id,
                            &item_id,
                            &mut audio_bytes,
                            &cancel,
                            &tx,
                        )
                        .await
                    {
                        self.finish_failed(
                            &response_id,
                            &item_id,
                            message_item_opened,
                            &text_transcript,
                            &audio_bytes,
                            want_audio,
                            &tool_calls,
                            err,
                            &tx,
                        );
                        return;
                    }
                }
            }
        }

        self.finish_completed(
            &response_id,
            &item_id,
            message_item_opened,
            &text_transcript,
            &audio_bytes,
            want_audio,
            &tool_calls,
            usage,
            &tx,
        );
    }

    #[allow(clippy::too_many_arguments)]
    async fn synthesize_and_emit(
        &self,
        tts: &dyn TextToSpeech,
        text: &str,
        voice: Voice,
        format: AudioFormat,
        response_id: &str,
        item_id: &str,
        audio_bytes: &mut Vec<u8>,
        cancel: &CancellationToken,
        tx: &UnboundedSender<SessionSignal>,
    ) -> Result<(), GatewayError> {
        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            result = tokio::time::timeout(self.deadlines.tts, tts.synthesize(text, voice, format)) => {
                result.map_err(|_| GatewayError::UpstreamTimeout("tts synthesis timed out".to_string()))??
            }
        };

        let emit = |event: RealtimeServerEvent| {
            let _ = tx.send(SessionSignal::ResponseEvent(event));
        };

        while let Some(chunk) = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            next = tokio::time::timeout(self.deadlines.tts, stream.next()) => {
                match next {
                    Ok(next) => next,
                    Err(_) => return Err(GatewayError::UpstreamTimeout("tts synthesis timed out".to_string())),
                }
            }
        } {
            let chunk = chunk?;
            emit_audio_frames(&chunk, response_id, item_id, &emit);
            audio_bytes.extend_from_slice(&chunk);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_completed(
        &self,
        response_id: &str,
        item_id: &str,
        message_item_opened: bool,
        text_transcript: &str,
        audio_bytes: &[u8],
        want_audio: bool,
        tool_calls: &[PendingToolCall],
        usage: Option<ResponseUsage>,
        tx: &UnboundedSender<SessionSignal>,
    ) {
        let emit = |event: RealtimeServerEvent| {
            let _ = tx.send(SessionSignal::ResponseEvent(event));
        };

        let mut output = Vec::new();

        if message_item_opened {
            if want_audio {
                emit(RealtimeServerEvent::ResponseAudioTranscriptDone {
                    event_id: crate::ids::new_event_id(),
                    response_id: response_id.to_string(),
                    item_id: item_id.to_string(),
                    output_index: 0,
                    content_index: 0,
                    transcript: text_transcript.to_string(),
                });
                emit(RealtimeServerEvent::ResponseAudioDone {
                    event_id: crate::ids::new_event_id(),
                    response_id: response_id.to_string(),
                    item_id: item_id.to_string(),
                    output_index: 0,
                    content_index: 0,
                });
            } else {
                emit(RealtimeServerEvent::ResponseTextDone {
                    event_id: crate::ids::new_event_id(),
                    response_id: response_id.to_string(),
                    item_id: item_id.to_string(),
                    output_index: 0,
                    content_index: 0,
                    text: text_transcript.to_string(),
                });
            }
            emit(RealtimeServerEvent::ResponseContentPartDone {
                event_id: crate::ids::new_event_id(),
                response_id: response_id.to_string(),
                item_id: item_id.to_string(),
                output_index: 0,
                content_index: 0,
            });

            let item = finalized_message_item(item_id, text_transcript, audio_bytes, want_audio);
            emit(RealtimeServerEvent::ResponseOutputItemDone {
                event_id: crate::ids::new_event_id(),
                response_id: response_id.to_string(),
                output_index: 0,
                item: item.clone(),
            });
            output.push(item);
        }

        for (idx, call) in tool_calls.iter().enumerate() {
            let call_item_id = format!("item_{response_id}_call_{}", call.call_id);
            emit(RealtimeServerEvent::ResponseFunctionCallArgumentsDone {
                event_id: crate::ids::new_event_id(),
                response_id: response_id.to_string(),
                item_id: call_item_id.clone(),
                output_index: (idx + 1) as u32,
                call_id: call.call_id.clone(),
                arguments: call.arguments.clone(),
            });
            let item =
                ConversationItem::function_call(call_item_id, call.call_id.clone(), call.name.clone(), call.arguments.clone());
            emit(RealtimeServerEvent::ResponseOutputItemDone {
                event_id: crate::ids::new_event_id(),
                response_id: response_id.to_string(),
                output_index: (idx + 1) as u32,
                item: item.clone(),
            });
            output.push(item);
        }

        let mut response = Response::new(response_id.to_string());
        response.status = ResponseStatus::Completed;
        response.status_details = Some(ResponseStatusDetails::Completed);
        response.output = output.clone();
        response.usage = usage.clone();

        emit(RealtimeServerEvent::ResponseDone {
            event_id: crate::ids::new_event_id(),
            response,
        });

        let _ = tx.send(SessionSignal::ResponseFinalized {
            response_id: response_id.to_string(),
            outcome: ResponseOutcome::Completed,
            items: output,
            usage,
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_failed(
        &self,
        response_id: &str,
        item_id: &str,
        message_item_opened: bool,
        text_transcript: &str,
        audio_bytes: &[u8],
        want_audio: bool,
        tool_calls: &[PendingToolCall],
        err: GatewayError,
        tx: &UnboundedSender<SessionSignal>,
    ) {
        let output = build_incomplete_output(
            response_id,
            item_id,
            message_item_opened,
            text_transcript,
            audio_bytes,
            want_audio,
            tool_calls,
        );

        let mut response = Response::new(response_id.to_string());
        response.status = ResponseStatus::Failed;
        response.status_details = Some(ResponseStatusDetails::Failed {
            error: conversation_protocol::response::ResponseError {
                error_type: err.code().to_string(),
                message: err.to_string(),
            },
        });
        response.output = output.clone();

        let _ = tx.send(SessionSignal::ResponseEvent(RealtimeServerEvent::ResponseFailed {
            event_id: crate::ids::new_event_id(),
            response,
        }));
        let _ = tx.send(SessionSignal::ResponseFinalized {
            response_id: response_id.to_string(),
            outcome: ResponseOutcome::Failed(err),
            items: output,
            usage: None,
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_cancelled(
        &self,
        response_id: &str,
        item_id: &str,
        message_item_opened: bool,
        text_transcript: &str,
        audio_bytes: &[u8],
        want_audio: bool,
        tool_calls: &[PendingToolCall],
        tx: &UnboundedSender<SessionSignal>,
    ) {
        let output = build_incomplete_output(
            response_id,
            item_id,
            message_item_opened,
            text_transcript,
            audio_bytes,
            want_audio,
            tool_calls,
        );

        let mut response = Response::new(response_id.to_string());
        response.status = ResponseStatus::Cancelled;
        response.status_details = Some(ResponseStatusDetails::Cancelled);
        response.output = output.clone();

        let _ = tx.send(SessionSignal::ResponseEvent(RealtimeServerEvent::ResponseCancelled {
            event_id: crate::ids::new_event_id(),
            response,
        }));
        let _ = tx.send(SessionSignal::ResponseFinalized {
            response_id: response_id.to_string(),
            outcome: ResponseOutcome::Cancelled,
            items: output,
            usage: None,
        });
    }
}

#[allow(clippy::too_many_arguments)]
fn build_incomplete_output(
    response_id: &str,
    item_id: &str,
    message_item_opened: bool,
    text_transcript: &str,
    audio_bytes: &[u8],
    want_audio: bool,
    tool_calls: &[PendingToolCall],
) -> Vec<ConversationItem> {
    let mut output = Vec::new();
    if message_item_opened {
        output.push(finalized_message_item_incomplete(
            item_id,
            text_transcript,
            audio_bytes,
            want_audio,
        ));
    }
    for call in tool_calls {
        let call_item_id = format!("item_{response_id}_call_{}", call.call_id);
        output.push(ConversationItem::FunctionCall {
            id: call_item_id,
            object: "realtime.item".to_string(),
            status: ItemStatus::Incomplete,
            call_id: call.call_id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        });
    }
    output
}

fn should_flush(buffer: &str) -> bool {
    if buffer.len() >= DEFAULT_SENTENCE_FLUSH_CHARS {
        return true;
    }
    matches!(buffer.chars().last(), Some('.') | Some('!') | Some('?') | Some('\n'))
}

fn emit_audio_frames(
    chunk: &[u8],
    response_id: &str,
    item_id: &str,
    emit: &impl Fn(RealtimeServerEvent),
) {
    for frame in chunk.chunks(FRAME_BYTES) {
        emit(RealtimeServerEvent::ResponseAudioDelta {
            event_id: crate::ids::new_event_id(),
            response_id: response_id.to_string(),
            item_id: item_id.to_string(),
            output_index: 0,
            content_index: 0,
            delta: base64::engine::general_purpose::STANDARD.encode(frame),
        });
    }
}

fn placeholder_message_item(item_id: &str, want_audio: bool) -> ConversationItem {
    let content = if want_audio {
        vec![ContentPart::OutputAudio { audio: String::new(), transcript: Some(String::new()) }]
    } else {
        vec![ContentPart::OutputText { text: String::new() }]
    };
    ConversationItem::Message {
        id: item_id.to_string(),
        object: "realtime.item".to_string(),
        status: ItemStatus::InProgress,
        role: Role::Assistant,
        content,
    }
}

fn finalized_message_item(
    item_id: &str,
    text_transcript: &str,
    audio_bytes: &[u8],
    want_audio: bool,
) -> ConversationItem {
    let content = if want_audio {
        vec![ContentPart::OutputAudio {
            audio: base64::engine::general_purpose::STANDARD.encode(audio_bytes),
            transcript: Some(text_transcript.to_string()),
        }]
    } else {
        vec![ContentPart::OutputText { text: text_transcript.to_string() }]
    };
    ConversationItem::Message {
        id: item_id.to_string(),
        object: "realtime.item".to_string(),
        status: ItemStatus::Completed,
        role: Role::Assistant,
        content,
    }
}

fn finalized_message_item_incomplete(
    item_id: &str,
    text_transcript: &str,
    audio_bytes: &[u8],
    want_audio: bool,
) -> ConversationItem {
    let mut item = finalized_message_item(item_id, text_transcript, audio_bytes, want_audio);
    if let ConversationItem::Message { status, .. } = &mut item {
        *status = ItemStatus::Incomplete;
    }
    item
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_on_terminal_punctuation() {
        assert!(should_flush("That's all folks."));
        assert!(should_flush("wait\n"));
        assert!(!should_flush("still going"));
    }

    #[test]
    fn flush_on_length_bound() {
        let long = "a".repeat(DEFAULT_SENTENCE_FLUSH_CHARS);
        assert!(should_flush(&long));
    }

    #[test]
    fn frame_chunking_respects_twenty_ms_boundary() {
        let mut seen = Vec::new();
        let emit = |event: RealtimeServerEvent| seen.push(event);
        emit_audio_frames(&vec![0u8; FRAME_BYTES * 2 + 10], "resp_1", "item_1", &emit);
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn incomplete_output_retains_partial_message_and_tool_calls() {
        let tool_calls = vec![PendingToolCall {
            call_id: "call_1".to_string(),
            name: "lookup".to_string(),
            arguments: "{\"city\":\"Bo".to_string(),
        }];
        let output = build_incomplete_output(
            "resp_1",
            "item_resp_1_msg",
            true,
            "partial tex",
            &[],
            false,
            &tool_calls,
        );
        assert_eq!(output.len(), 2);
        match &output[0] {
            ConversationItem::Message { status, .. } => assert_eq!(*status, ItemStatus::Incomplete),
            _ => panic!("expected message item"),
        }
        match &output[1] {
            ConversationItem::FunctionCall { status, arguments, .. } => {
                assert_eq!(*status, ItemStatus::Incomplete);
                assert_eq!(arguments, "{\"city\":\"Bo");
            }
            _ => panic!("expected function call item"),
        }
    }
}
