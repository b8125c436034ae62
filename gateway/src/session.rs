//! The Session State Machine (spec §4.5): owns the Conversation Log, the
//! Input-Audio Buffer, and at most one active Response, multiplexing
//! inbound client events and internal signals into a single ordered
//! outbound event stream.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use conversation_protocol::client_events::RealtimeClientEvent;
use conversation_protocol::codec;
use conversation_protocol::conversation::{ContentPart, ConversationItem, ItemStatus, Role};
use conversation_protocol::response::ResponseConfig;
use conversation_protocol::server_events::{ApiError, RealtimeServerEvent};
use conversation_protocol::session::{Intent, Modality, SessionConfig};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

use crate::audio::InputAudioBuffer;
use crate::collaborators::{ChatMessage, ChatRequest, SpeechToText, VoiceActivityDetector};
use crate::conversation::ConversationLog;
use crate::error::GatewayError;
use crate::ids::{new_event_id, new_response_id};
use crate::response::ResponseOrchestrator;
use crate::signal::{ResponseOutcome, SessionSignal};

/// 16-bit mono PCM @ 24 kHz: 48 bytes per millisecond.
const BYTES_PER_MS: f64 = 48.0;

/// Abstracts the WebSocket write half so the actor loop can be driven by
/// a fake in tests without pulling in axum.
#[async_trait]
pub trait EventSink: Send {
    async fn send(&mut self, text: String);
    async fn close(&mut self, code: u16, reason: &str);
}

struct ActiveResponse {
    response_id: String,
    cancel: CancellationToken,
    referenced_item_ids: HashSet<String>,
}

pub struct Session {
    id: String,
    model_id: String,
    config: SessionConfig,
    log: ConversationLog,
    audio: InputAudioBuffer,
    vad: Option<Box<dyn VoiceActivityDetector>>,
    stt: Option<Arc<dyn SpeechToText>>,
    orchestrator: Arc<ResponseOrchestrator>,
    stt_timeout: Duration,
    active: Option<ActiveResponse>,
    pending_vad_item_id: Option<String>,
    /// Item id of a server-VAD commit whose transcription is still in
    /// flight; the auto-triggered response waits for it so the LLM sees
    /// the transcript instead of a transcript-less history item.
    pending_auto_response_item_id: Option<String>,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        model_id: String,
        config: SessionConfig,
        audio_capacity_bytes: usize,
        vad: Option<Box<dyn VoiceActivityDetector>>,
        stt: Option<Arc<dyn SpeechToText>>,
        orchestrator: Arc<ResponseOrchestrator>,
        stt_timeout: Duration,
    ) -> Self {
        Self {
            id,
            model_id,
            config,
            log: ConversationLog::new(),
            audio: InputAudioBuffer::new(audio_capacity_bytes),
            vad,
            stt,
            orchestrator,
            stt_timeout,
            active: None,
            pending_vad_item_id: None,
            pending_auto_response_item_id: None,
        }
    }

    fn session_object(&self) -> conversation_protocol::session::Session {
        conversation_protocol::session::Session::new(self.id.clone(), self.model_id.clone(), self.config.clone())
    }

    async fn emit(&self, sink: &mut impl EventSink, event: RealtimeServerEvent) {
        match codec::encode_server_event(&event) {
            Ok(text) => sink.send(text).await,
            Err(err) => tracing::error!(error = %err, "failed to encode outbound event"),
        }
    }

    async fn emit_error(&self, sink: &mut impl EventSink, err: GatewayError, event_id: Option<String>) {
        tracing::warn!(error = %err, "event handling error");
        let mut api_error = ApiError::new(err.kind(), err.to_string());
        if let Some(id) = event_id {
            api_error = api_error.with_event_id(id);
        }
        self.emit(sink, RealtimeServerEvent::Error { event_id: new_event_id(), error: api_error })
            .await;
    }

    /// Runs the actor to completion: consumes `rx` until the socket closes
    /// or the receiver is dropped, writing every resulting event to `sink`.
    pub async fn run(
        mut self,
        mut rx: UnboundedReceiver<SessionSignal>,
        tx: UnboundedSender<SessionSignal>,
        mut sink: impl EventSink,
    ) {
        let span = tracing::info_span!("realtime_session", session_id = %self.id);
        let _enter = span.enter();

        let created = RealtimeServerEvent::SessionCreated {
            event_id: new_event_id(),
            session: self.session_object(),
        };
        self.emit(&mut sink, created).await;

        while let Some(signal) = rx.recv().await {
            match signal {
                SessionSignal::SocketClosed => break,
                SessionSignal::ClientText(bytes) => {
                    self.handle_client_bytes(&bytes, &tx, &mut sink).await;
                }
                SessionSignal::ResponseEvent(event) => {
                    self.emit(&mut sink, event).await;
                }
                SessionSignal::ResponseFinalized { response_id, outcome, items, .. } => {
                    self.finalize_response(&response_id, outcome, items);
                }
                SessionSignal::TranscriptionCompleted { item_id, content_index, transcript } => {
                    self.apply_transcription(&item_id, &transcript);
                    self.emit(
                        &mut sink,
                        RealtimeServerEvent::ConversationItemInputAudioTranscriptionCompleted {
                            event_id: new_event_id(),
                            item_id: item_id.clone(),
                            content_index,
                            transcript,
                        },
                    )
                    .await;
                    self.maybe_start_deferred_auto_response(&item_id, &tx);
                }
                SessionSignal::TranscriptionFailed { item_id, content_index, error } => {
                    self.emit(
                        &mut sink,
                        RealtimeServerEvent::ConversationItemInputAudioTranscriptionFailed {
                            event_id: new_event_id(),
                            item_id: item_id.clone(),
                            content_index,
                            error: ApiError::new(error.kind(), error.to_string()),
                        },
                    )
                    .await;
                    self.maybe_start_deferred_auto_response(&item_id, &tx);
                }
            }
        }

        tracing::debug!("session actor loop exiting");
    }

    async fn handle_client_bytes(
        &mut self,
        bytes: &[u8],
        tx: &UnboundedSender<SessionSignal>,
        sink: &mut impl EventSink,
    ) {
        let event = match codec::decode_client_event(bytes) {
            Ok(event) => event,
            Err(err) => {
                self.emit_error(sink, GatewayError::Codec(err), None).await;
                return;
            }
        };
        self.handle_client_event(event, tx, sink).await;
    }

    async fn handle_client_event(
        &mut self,
        event: RealtimeClientEvent,
        tx: &UnboundedSender<SessionSignal>,
        sink: &mut impl EventSink,
    ) {
        let event_id = event.event_id().map(str::to_string);

        let result: Result<(), GatewayError> = match event {
            RealtimeClientEvent::SessionUpdate { session, .. } => {
                self.config.apply_patch(session);
                self.emit(
                    sink,
                    RealtimeServerEvent::SessionUpdated { event_id: new_event_id(), session: self.session_object() },
                )
                .await;
                Ok(())
            }
            RealtimeClientEvent::InputAudioBufferAppend { audio, .. } => {
                self.handle_audio_append(&audio, tx, sink).await
            }
            RealtimeClientEvent::InputAudioBufferClear { .. } => {
                self.audio.clear();
                self.emit(sink, RealtimeServerEvent::InputAudioBufferCleared { event_id: new_event_id() })
                    .await;
                Ok(())
            }
            RealtimeClientEvent::InputAudioBufferCommit { .. } => {
                self.handle_manual_commit(tx, sink).await
            }
            RealtimeClientEvent::ConversationItemCreate { item, .. } => {
                self.handle_item_create(item, sink).await
            }
            RealtimeClientEvent::ConversationItemTruncate { item_id, content_index, audio_end_ms, .. } => {
                match self.log.truncate(&item_id, content_index as usize, audio_end_ms) {
                    Ok(()) => {
                        self.emit(
                            sink,
                            RealtimeServerEvent::ConversationItemTruncated {
                                event_id: new_event_id(),
                                item_id,
                                content_index,
                                audio_end_ms,
                            },
                        )
                        .await;
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            RealtimeClientEvent::ConversationItemDelete { item_id, .. } => {
                let referenced = self
                    .active
                    .as_ref()
                    .map(|a| a.referenced_item_ids.clone())
                    .unwrap_or_default();
                match self.log.delete(&item_id, &referenced) {
                    Ok(_) => {
                        self.emit(sink, RealtimeServerEvent::ConversationItemDeleted { event_id: new_event_id(), item_id })
                            .await;
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            RealtimeClientEvent::ResponseCreate { response, .. } => {
                self.handle_response_create(response, tx).await
            }
            RealtimeClientEvent::ResponseCancel { response_id, .. } => self.handle_response_cancel(response_id),
            RealtimeClientEvent::Unknown => Err(GatewayError::InvalidRequest("unrecognized event type".to_string())),
        };

        if let Err(err) = result {
            self.emit_error(sink, err, event_id).await;
        }
    }

    async fn handle_item_create(&mut self, item: ConversationItem, sink: &mut impl EventSink) -> Result<(), GatewayError> {
        let previous_item_id = self.log.last_item_id();
        match self.log.append(item) {
            Ok(appended) => {
                let appended = appended.clone();
                self.emit(
                    sink,
                    RealtimeServerEvent::ConversationItemCreated {
                        event_id: new_event_id(),
                        previous_item_id,
                        item: appended,
                    },
                )
                .await;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn handle_audio_append(
        &mut self,
        audio_b64: &str,
        tx: &UnboundedSender<SessionSignal>,
        sink: &mut impl EventSink,
    ) -> Result<(), GatewayError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(audio_b64.as_bytes())
            .map_err(|e| GatewayError::InvalidRequest(format!("audio is not valid base64: {e}")))?;

        let base_offset = self.audio.write_cursor();
        self.audio.append(&bytes)?;

        let vad_active = self
            .config
            .turn_detection
            .as_ref()
            .map(|t| !t.is_manual())
            .unwrap_or(false);

        if vad_active {
            if let Some(vad) = &mut self.vad {
                let edges = vad.feed(&bytes, 24_000, base_offset).await?;
                for edge in edges {
                    self.handle_vad_edge(edge, tx, sink).await;
                }
            }
        }
        Ok(())
    }

    async fn handle_vad_edge(
        &mut self,
        edge: crate::collaborators::VadEdge,
        tx: &UnboundedSender<SessionSignal>,
        sink: &mut impl EventSink,
    ) {
        use crate::collaborators::VadEdge;
        match edge {
            VadEdge::SpeechStarted { offset } => {
                let item_id = self.log.reserve_item_id();
                self.pending_vad_item_id = Some(item_id.clone());
                self.emit(
                    sink,
                    RealtimeServerEvent::InputAudioBufferSpeechStarted {
                        event_id: new_event_id(),
                        audio_start_ms: offset_to_ms(offset),
                        item_id,
                    },
                )
                .await;
            }
            VadEdge::SpeechStopped { offset } => {
                let item_id = self.pending_vad_item_id.clone().unwrap_or_default();
                self.emit(
                    sink,
                    RealtimeServerEvent::InputAudioBufferSpeechStopped {
                        event_id: new_event_id(),
                        audio_end_ms: offset_to_ms(offset),
                        item_id,
                    },
                )
                .await;

                let reserved_id = self.pending_vad_item_id.take();
                if let Some(sealed) = self.audio.commit_to(offset) {
                    let awaiting_transcription = self.commit_audio_region(sealed, reserved_id, tx, sink).await;

                    if self.active.is_none() && self.config.intent != Intent::Transcription {
                        match awaiting_transcription {
                            // A transcription is in flight for the just-committed item: defer
                            // the auto-response until it resolves, so the LLM sees the
                            // transcript and `transcription.completed` precedes `response.created`.
                            Some(item_id) => self.pending_auto_response_item_id = Some(item_id),
                            None => self.start_response(None, tx),
                        }
                    } else if self.active.is_some() {
                        tracing::warn!("server-VAD-triggered response suppressed: a response is already active");
                    }
                }
            }
        }
    }

    async fn handle_manual_commit(
        &mut self,
        tx: &UnboundedSender<SessionSignal>,
        sink: &mut impl EventSink,
    ) -> Result<(), GatewayError> {
        if let Some(sealed) = self.audio.commit() {
            self.commit_audio_region(sealed, None, tx, sink).await;
        }
        Ok(())
    }

    /// Appends the sealed region as a conversation item and, if an STT
    /// collaborator is configured, spawns its transcription. Returns the
    /// item id when a transcription was spawned for it, so callers that
    /// auto-trigger a response off this commit can wait for the transcript
    /// instead of racing it.
    async fn commit_audio_region(
        &mut self,
        sealed: Vec<u8>,
        reserved_item_id: Option<String>,
        tx: &UnboundedSender<SessionSignal>,
        sink: &mut impl EventSink,
    ) -> Option<String> {
        let previous_item_id = self.log.last_item_id();
        let item = ConversationItem::Message {
            id: reserved_item_id.unwrap_or_default(),
            object: "realtime.item".to_string(),
            status: ItemStatus::Completed,
            role: Role::User,
            content: vec![ContentPart::InputAudio {
                audio: base64::engine::general_purpose::STANDARD.encode(&sealed),
                transcript: None,
            }],
        };
        let appended = match self.log.append(item) {
            Ok(appended) => appended.clone(),
            Err(err) => {
                self.emit_error(sink, err, None).await;
                return None;
            }
        };
        let item_id = appended.id().unwrap().to_string();

        self.emit(
            sink,
            RealtimeServerEvent::InputAudioBufferCommitted {
                event_id: new_event_id(),
                previous_item_id: previous_item_id.clone(),
                item_id: item_id.clone(),
            },
        )
        .await;
        self.emit(
            sink,
            RealtimeServerEvent::ConversationItemCreated {
                event_id: new_event_id(),
                previous_item_id,
                item: appended,
            },
        )
        .await;

        if let Some(stt) = self.stt.clone() {
            let model_id = self
                .config
                .input_audio_transcription
                .as_ref()
                .map(|t| t.model.clone())
                .unwrap_or_else(|| "whisper-1".to_string());
            let language = self
                .config
                .input_audio_transcription
                .as_ref()
                .and_then(|t| t.language.clone());
            let tx = tx.clone();
            let timeout = self.stt_timeout;
            let spawned_item_id = item_id.clone();
            tokio::spawn(async move {
                let outcome = tokio::time::timeout(timeout, stt.transcribe(&sealed, 24_000, &model_id, language.as_deref())).await;
                let signal = match outcome {
                    Ok(Ok(transcript)) => SessionSignal::TranscriptionCompleted {
                        item_id: spawned_item_id,
                        content_index: 0,
                        transcript,
                    },
                    Ok(Err(error)) => SessionSignal::TranscriptionFailed { item_id: spawned_item_id, content_index: 0, error },
                    Err(_) => SessionSignal::TranscriptionFailed {
                        item_id: spawned_item_id,
                        content_index: 0,
                        error: GatewayError::UpstreamTimeout("speech-to-text call timed out".to_string()),
                    },
                };
                let _ = tx.send(signal);
            });
            return Some(item_id);
        }
        None
    }

    /// Starts the response deferred by a server-VAD commit once its
    /// transcription resolves (success or failure), unless something else
    /// already started or cancelled a response in the meantime.
    fn maybe_start_deferred_auto_response(&mut self, item_id: &str, tx: &UnboundedSender<SessionSignal>) {
        if self.pending_auto_response_item_id.as_deref() != Some(item_id) {
            return;
        }
        self.pending_auto_response_item_id = None;
        if self.active.is_none() && self.config.intent != Intent::Transcription {
            self.start_response(None, tx);
        }
    }

    fn apply_transcription(&mut self, item_id: &str, transcript: &str) {
        self.log.set_input_audio_transcript(item_id, transcript);
    }

    async fn handle_response_create(
        &mut self,
        overrides: Option<ResponseConfig>,
        tx: &UnboundedSender<SessionSignal>,
    ) -> Result<(), GatewayError> {
        if self.active.is_some() {
            return Err(GatewayError::ResponseAlreadyActive(
                "a response is already in progress for this session".to_string(),
            ));
        }
        if self.config.intent == Intent::Transcription {
            return Err(GatewayError::UnsupportedIntent(
                "response.create is disabled while intent == transcription".to_string(),
            ));
        }
        self.start_response(overrides, tx);
        Ok(())
    }

    fn start_response(&mut self, overrides: Option<ResponseConfig>, tx: &UnboundedSender<SessionSignal>) {
        let overrides = overrides.unwrap_or_default();

        let instructions = overrides.instructions.unwrap_or_else(|| self.config.instructions.clone());
        let modalities = overrides.modalities.unwrap_or_else(|| self.config.modalities.clone());
        let want_audio = modalities.contains(&Modality::Audio);
        let voice = overrides.voice.unwrap_or(self.config.voice);
        let temperature = overrides.temperature.unwrap_or(self.config.temperature);
        let max_tokens = overrides
            .max_response_output_tokens
            .unwrap_or(self.config.max_response_output_tokens)
            .as_limit();
        let tools = overrides.tools.unwrap_or_else(|| self.config.tools.clone());
        let tool_choice = if tools.is_empty() {
            None
        } else {
            Some(overrides.tool_choice.unwrap_or_else(|| self.config.tool_choice.clone()))
        };

        let mut messages = vec![ChatMessage::system(instructions)];
        messages.extend(self.log.project_history());

        let request = ChatRequest {
            model_id: self.model_id.clone(),
            messages,
            tools,
            tool_choice,
            want_audio,
            voice,
            audio_format: self.config.output_audio_format,
            temperature,
            max_tokens,
        };

        let response_id = new_response_id();
        let cancel = CancellationToken::new();
        let referenced_item_ids = self.log.item_ids();

        self.orchestrator.clone().spawn(
            response_id.clone(),
            request,
            want_audio,
            voice,
            self.config.output_audio_format,
            tx.clone(),
            cancel.clone(),
        );

        self.active = Some(ActiveResponse { response_id, cancel, referenced_item_ids });
    }

    fn handle_response_cancel(&mut self, response_id: Option<String>) -> Result<(), GatewayError> {
        match &self.active {
            Some(active) => {
                if let Some(requested) = &response_id {
                    if requested != &active.response_id {
                        return Err(GatewayError::ItemNotFound(format!(
                            "no active response with id {requested}"
                        )));
                    }
                }
                active.cancel.cancel();
                Ok(())
            }
            None => Err(GatewayError::InvalidRequest("no response is active to cancel".to_string())),
        }
    }

    fn finalize_response(&mut self, response_id: &str, _outcome: ResponseOutcome, items: Vec<ConversationItem>) {
        if self.active.as_ref().map(|a| a.response_id.as_str()) != Some(response_id) {
            return;
        }
        self.active = None;
        for item in items {
            if let Err(err) = self.log.append(item) {
                tracing::error!(error = %err, "failed to append finalized response item");
            }
        }
    }
}

fn offset_to_ms(offset: usize) -> u32 {
    (offset as f64 / BYTES_PER_MS) as u32
}
