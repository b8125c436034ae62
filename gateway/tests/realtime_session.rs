//! End-to-end actor tests: drive a [`Session`] through its public event
//! loop with fake collaborators, the same way a WebSocket client would.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use conversation_protocol::client_events::RealtimeClientEvent;
use conversation_protocol::conversation::ConversationItem;
use conversation_protocol::response::ResponseConfig;
use conversation_protocol::server_events::RealtimeServerEvent;
use conversation_protocol::session::{Modality, SessionConfig};
use futures::stream::{self, BoxStream};
use realtime_gateway::collaborators::{
    ChatCompletion, ChatDelta, ChatRequest, SpeechToText, TextToSpeech, VadEdge, VoiceActivityDetector,
};
use realtime_gateway::error::GatewayError;
use realtime_gateway::response::{ResponseDeadlines, ResponseOrchestrator};
use realtime_gateway::session::{EventSink, Session};
use realtime_gateway::signal::SessionSignal;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

struct ChannelSink {
    tx: UnboundedSender<String>,
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send(&mut self, text: String) {
        let _ = self.tx.send(text);
    }
    async fn close(&mut self, _code: u16, _reason: &str) {}
}

/// Echoes a single text reply and completes.
struct EchoLlm {
    reply: String,
}

#[async_trait]
impl ChatCompletion for EchoLlm {
    async fn stream_chat(
        &self,
        _request: ChatRequest,
    ) -> Result<BoxStream<'static, Result<ChatDelta, GatewayError>>, GatewayError> {
        Ok(Box::pin(stream::iter(vec![Ok(ChatDelta::Text(self.reply.clone()))])))
    }
}

/// Requests a single tool call and completes.
struct ToolCallingLlm;

#[async_trait]
impl ChatCompletion for ToolCallingLlm {
    async fn stream_chat(
        &self,
        _request: ChatRequest,
    ) -> Result<BoxStream<'static, Result<ChatDelta, GatewayError>>, GatewayError> {
        Ok(Box::pin(stream::iter(vec![Ok(ChatDelta::ToolCall {
            call_id: "call_1".to_string(),
            name: Some("get_time".to_string()),
            arguments_delta: "{}".to_string(),
        })])))
    }
}

/// Never finishes on its own — used to exercise mid-response cancellation.
struct StallingLlm;

#[async_trait]
impl ChatCompletion for StallingLlm {
    async fn stream_chat(
        &self,
        _request: ChatRequest,
    ) -> Result<BoxStream<'static, Result<ChatDelta, GatewayError>>, GatewayError> {
        let stream = stream::unfold((), |_| async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Some((Ok(ChatDelta::Text("still talking".to_string())), ()))
        });
        Ok(Box::pin(stream))
    }
}

/// Always resolves to the same transcript, after a short delay so tests can
/// observe events emitted while the transcription is still in flight.
struct DelayedStt {
    transcript: String,
    delay: Duration,
}

#[async_trait]
impl SpeechToText for DelayedStt {
    async fn transcribe(
        &self,
        _pcm: &[u8],
        _sample_rate: u32,
        _model_id: &str,
        _language: Option<&str>,
    ) -> Result<String, GatewayError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.transcript.clone())
    }
}

/// Flags an edge on the first non-silent chunk, then the first all-zero
/// ("silent") chunk after that.
#[derive(Default)]
struct ThresholdVad {
    speaking: bool,
}

#[async_trait]
impl VoiceActivityDetector for ThresholdVad {
    async fn feed(&mut self, pcm: &[u8], _sample_rate: u32, base_offset: usize) -> Result<Vec<VadEdge>, GatewayError> {
        if !self.speaking {
            self.speaking = true;
            return Ok(vec![VadEdge::SpeechStarted { offset: base_offset }]);
        }
        if pcm.iter().all(|&b| b == 0) {
            self.speaking = false;
            return Ok(vec![VadEdge::SpeechStopped { offset: base_offset + pcm.len() }]);
        }
        Ok(vec![])
    }
}

fn orchestrator(llm: Arc<dyn ChatCompletion>, tts: Option<Arc<dyn TextToSpeech>>) -> Arc<ResponseOrchestrator> {
    Arc::new(ResponseOrchestrator {
        llm,
        tts,
        deadlines: ResponseDeadlines { llm_idle: Duration::from_secs(2), tts: Duration::from_secs(2) },
    })
}

fn new_session(
    config: SessionConfig,
    llm: Arc<dyn ChatCompletion>,
    stt: Option<Arc<dyn SpeechToText>>,
    vad: Option<Box<dyn VoiceActivityDetector>>,
    audio_capacity_bytes: usize,
) -> Session {
    Session::new(
        "sess_test".to_string(),
        "gateway-llm".to_string(),
        config,
        audio_capacity_bytes,
        vad,
        stt,
        orchestrator(llm, None),
        Duration::from_secs(2),
    )
}

struct Harness {
    driver_tx: UnboundedSender<SessionSignal>,
    out_rx: tokio::sync::mpsc::UnboundedReceiver<String>,
    handle: tokio::task::JoinHandle<()>,
}

impl Harness {
    fn spawn(session: Session) -> Self {
        let (tx, rx) = unbounded_channel::<SessionSignal>();
        let (out_tx, out_rx) = unbounded_channel::<String>();
        let driver_tx = tx.clone();
        let sink = ChannelSink { tx: out_tx };
        let handle = tokio::spawn(session.run(rx, tx, sink));
        Self { driver_tx, out_rx, handle }
    }

    fn send_client_event(&self, event: &RealtimeClientEvent) {
        let bytes = serde_json::to_vec(event).unwrap();
        self.driver_tx.send(SessionSignal::ClientText(bytes)).unwrap();
    }

    async fn next_event(&mut self) -> RealtimeServerEvent {
        let text = tokio::time::timeout(Duration::from_secs(2), self.out_rx.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed unexpectedly");
        serde_json::from_str(&text).unwrap()
    }

    async fn next_event_matching(&mut self, mut pred: impl FnMut(&RealtimeServerEvent) -> bool) -> RealtimeServerEvent {
        loop {
            let event = self.next_event().await;
            if pred(&event) {
                return event;
            }
        }
    }

    async fn finish(self) {
        self.driver_tx.send(SessionSignal::SocketClosed).unwrap();
        self.handle.await.unwrap();
    }
}

#[tokio::test]
async fn text_only_turn_produces_completed_response() {
    let mut config = SessionConfig::default();
    config.modalities = vec![Modality::Text];

    let session = new_session(config, Arc::new(EchoLlm { reply: "hi there".to_string() }), None, None, 48_000 * 30);
    let mut harness = Harness::spawn(session);

    assert!(matches!(harness.next_event().await, RealtimeServerEvent::SessionCreated { .. }));

    harness.send_client_event(&RealtimeClientEvent::ConversationItemCreate {
        event_id: None,
        previous_item_id: None,
        item: ConversationItem::user_text("", "hello"),
    });
    assert!(matches!(harness.next_event().await, RealtimeServerEvent::ConversationItemCreated { .. }));

    harness.send_client_event(&RealtimeClientEvent::ResponseCreate { event_id: None, response: None });

    let done = harness
        .next_event_matching(|e| matches!(e, RealtimeServerEvent::ResponseDone { .. }))
        .await;
    let RealtimeServerEvent::ResponseDone { response, .. } = done else { unreachable!() };
    assert_eq!(response.status, conversation_protocol::response::ResponseStatus::Completed);
    assert_eq!(response.output.len(), 1);

    harness.finish().await;
}

#[tokio::test]
async fn server_vad_turn_auto_triggers_response() {
    let config = SessionConfig::default();
    let vad: Box<dyn VoiceActivityDetector> = Box::new(ThresholdVad::default());

    let session = new_session(
        config,
        Arc::new(EchoLlm { reply: "ok".to_string() }),
        None,
        Some(vad),
        48_000 * 30,
    );
    let mut harness = Harness::spawn(session);
    assert!(matches!(harness.next_event().await, RealtimeServerEvent::SessionCreated { .. }));

    let speech = base64::engine::general_purpose::STANDARD.encode(vec![1u8; 960]);
    harness.send_client_event(&RealtimeClientEvent::InputAudioBufferAppend { event_id: None, audio: speech });
    assert!(matches!(
        harness.next_event().await,
        RealtimeServerEvent::InputAudioBufferSpeechStarted { .. }
    ));

    let silence = base64::engine::general_purpose::STANDARD.encode(vec![0u8; 960]);
    harness.send_client_event(&RealtimeClientEvent::InputAudioBufferAppend { event_id: None, audio: silence });
    assert!(matches!(
        harness.next_event().await,
        RealtimeServerEvent::InputAudioBufferSpeechStopped { .. }
    ));
    assert!(matches!(
        harness.next_event().await,
        RealtimeServerEvent::InputAudioBufferCommitted { .. }
    ));
    assert!(matches!(
        harness.next_event().await,
        RealtimeServerEvent::ConversationItemCreated { .. }
    ));

    // No client ever sent response.create — the falling VAD edge triggered it.
    assert!(matches!(harness.next_event().await, RealtimeServerEvent::ResponseCreated { .. }));

    harness.finish().await;
}

#[tokio::test]
async fn server_vad_turn_with_stt_waits_for_transcription_before_responding() {
    let config = SessionConfig::default();
    let vad: Box<dyn VoiceActivityDetector> = Box::new(ThresholdVad::default());
    let stt: Arc<dyn SpeechToText> =
        Arc::new(DelayedStt { transcript: "hello there".to_string(), delay: Duration::from_millis(100) });

    let session = new_session(
        config,
        Arc::new(EchoLlm { reply: "ok".to_string() }),
        Some(stt),
        Some(vad),
        48_000 * 30,
    );
    let mut harness = Harness::spawn(session);
    assert!(matches!(harness.next_event().await, RealtimeServerEvent::SessionCreated { .. }));

    let speech = base64::engine::general_purpose::STANDARD.encode(vec![1u8; 960]);
    harness.send_client_event(&RealtimeClientEvent::InputAudioBufferAppend { event_id: None, audio: speech });
    assert!(matches!(
        harness.next_event().await,
        RealtimeServerEvent::InputAudioBufferSpeechStarted { .. }
    ));

    let silence = base64::engine::general_purpose::STANDARD.encode(vec![0u8; 960]);
    harness.send_client_event(&RealtimeClientEvent::InputAudioBufferAppend { event_id: None, audio: silence });
    assert!(matches!(
        harness.next_event().await,
        RealtimeServerEvent::InputAudioBufferSpeechStopped { .. }
    ));
    assert!(matches!(
        harness.next_event().await,
        RealtimeServerEvent::InputAudioBufferCommitted { .. }
    ));
    assert!(matches!(
        harness.next_event().await,
        RealtimeServerEvent::ConversationItemCreated { .. }
    ));

    // The transcription completes before any response.created for this
    // commit — and it carries the transcript, not an empty one.
    let transcribed = harness.next_event().await;
    let RealtimeServerEvent::ConversationItemInputAudioTranscriptionCompleted { transcript, .. } = transcribed else {
        panic!("expected conversation.item.input_audio_transcription.completed next, got {transcribed:?}");
    };
    assert_eq!(transcript, "hello there");

    assert!(matches!(harness.next_event().await, RealtimeServerEvent::ResponseCreated { .. }));

    harness.finish().await;
}

#[tokio::test]
async fn response_cancel_mid_stream_yields_cancelled_status() {
    let config = SessionConfig::default();
    let session = new_session(config, Arc::new(StallingLlm), None, None, 48_000 * 30);
    let mut harness = Harness::spawn(session);
    assert!(matches!(harness.next_event().await, RealtimeServerEvent::SessionCreated { .. }));

    harness.send_client_event(&RealtimeClientEvent::ResponseCreate { event_id: None, response: None });
    assert!(matches!(harness.next_event().await, RealtimeServerEvent::ResponseCreated { .. }));

    harness.send_client_event(&RealtimeClientEvent::ResponseCancel { event_id: None, response_id: None });

    let cancelled = harness
        .next_event_matching(|e| matches!(e, RealtimeServerEvent::ResponseCancelled { .. }))
        .await;
    let RealtimeServerEvent::ResponseCancelled { response, .. } = cancelled else { unreachable!() };
    assert_eq!(response.status, conversation_protocol::response::ResponseStatus::Cancelled);

    harness.finish().await;
}

#[tokio::test]
async fn tool_call_output_is_accepted_after_function_call_completes() {
    let mut config = SessionConfig::default();
    config.modalities = vec![Modality::Text];

    let session = new_session(config, Arc::new(ToolCallingLlm), None, None, 48_000 * 30);
    let mut harness = Harness::spawn(session);
    assert!(matches!(harness.next_event().await, RealtimeServerEvent::SessionCreated { .. }));

    harness.send_client_event(&RealtimeClientEvent::ResponseCreate { event_id: None, response: None });

    let done = harness
        .next_event_matching(|e| matches!(e, RealtimeServerEvent::ResponseDone { .. }))
        .await;
    let RealtimeServerEvent::ResponseDone { response, .. } = done else { unreachable!() };
    assert_eq!(response.output.len(), 1);
    assert!(matches!(&response.output[0], ConversationItem::FunctionCall { call_id, .. } if call_id == "call_1"));

    // The log now knows about call_1 — a function_call_output referencing it
    // should be accepted rather than rejected as unknown.
    harness.send_client_event(&RealtimeClientEvent::ConversationItemCreate {
        event_id: None,
        previous_item_id: None,
        item: ConversationItem::function_output("", "call_1", "12:00"),
    });
    assert!(matches!(harness.next_event().await, RealtimeServerEvent::ConversationItemCreated { .. }));

    harness.finish().await;
}

#[tokio::test]
async fn input_audio_buffer_overrun_reports_error_without_crashing_the_session() {
    let mut config = SessionConfig::default();
    config.turn_detection = None;

    let session = new_session(config, Arc::new(EchoLlm { reply: "n/a".to_string() }), None, None, 16);
    let mut harness = Harness::spawn(session);
    assert!(matches!(harness.next_event().await, RealtimeServerEvent::SessionCreated { .. }));

    let oversized = base64::engine::general_purpose::STANDARD.encode(vec![1u8; 64]);
    harness.send_client_event(&RealtimeClientEvent::InputAudioBufferAppend { event_id: None, audio: oversized });

    let RealtimeServerEvent::Error { error, .. } = harness.next_event().await else {
        panic!("expected an error event");
    };
    assert_eq!(error.code, "input_audio_buffer_overrun");

    // The session keeps running afterwards.
    harness.send_client_event(&RealtimeClientEvent::InputAudioBufferClear { event_id: None });
    assert!(matches!(
        harness.next_event().await,
        RealtimeServerEvent::InputAudioBufferCleared { .. }
    ));

    harness.finish().await;
}

#[tokio::test]
async fn response_create_honors_per_response_modality_override() {
    let config = SessionConfig::default();
    let session = new_session(config, Arc::new(EchoLlm { reply: "spoken reply".to_string() }), None, None, 48_000 * 30);
    let mut harness = Harness::spawn(session);
    assert!(matches!(harness.next_event().await, RealtimeServerEvent::SessionCreated { .. }));

    harness.send_client_event(&RealtimeClientEvent::ResponseCreate {
        event_id: None,
        response: Some(ResponseConfig { modalities: Some(vec![Modality::Text]), ..Default::default() }),
    });

    assert!(matches!(harness.next_event().await, RealtimeServerEvent::ResponseCreated { .. }));
    assert!(matches!(
        harness.next_event().await,
        RealtimeServerEvent::ResponseOutputItemAdded { .. }
    ));
    assert!(matches!(
        harness.next_event().await,
        RealtimeServerEvent::ResponseContentPartAdded { .. }
    ));
    // Text modality, not audio — expect a text delta, not an audio transcript delta.
    assert!(matches!(harness.next_event().await, RealtimeServerEvent::ResponseTextDelta { .. }));

    harness.finish().await;
}
