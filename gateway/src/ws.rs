//! WebSocket upgrade: `GET /v1/realtime?model=<id>[&intent=transcription]`.
//!
//! Bearer-token auth (when configured) is checked before the upgrade so a
//! rejected handshake never gets a session actor spun up for it.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use conversation_protocol::session::{Intent, SessionConfig};
use dashmap::DashSet;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::collaborators::{ChatCompletion, SpeechToText, TextToSpeech, VoiceActivityDetector};
use crate::config::GatewayConfig;
use crate::response::{ResponseDeadlines, ResponseOrchestrator};
use crate::routers::error;
use crate::session::{EventSink, Session};
use crate::signal::SessionSignal;

/// Wires up the collaborators a session needs; `main.rs` constructs one of
/// these from whatever concrete STT/LLM/TTS/VAD clients are available.
pub struct Collaborators {
    pub llm: Arc<dyn ChatCompletion>,
    pub stt: Option<Arc<dyn SpeechToText>>,
    pub tts: Option<Arc<dyn TextToSpeech>>,
    pub vad_factory: Option<Arc<dyn Fn() -> Box<dyn VoiceActivityDetector> + Send + Sync>>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub collaborators: Arc<Collaborators>,
    pub active_sessions: Arc<DashSet<String>>,
}

impl AppState {
    pub fn new(config: Arc<GatewayConfig>, collaborators: Arc<Collaborators>) -> Self {
        Self { config, collaborators, active_sessions: Arc::new(DashSet::new()) }
    }
}

#[derive(Debug, Deserialize)]
pub struct RealtimeQuery {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    intent: Option<String>,
}

pub async fn upgrade_handler(
    State(state): State<AppState>,
    Query(query): Query<RealtimeQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if let Some(expected) = &state.config.auth_token {
        let supplied = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if supplied != Some(expected.as_str()) {
            return error::unauthorized("invalid_request", "missing or invalid bearer token");
        }
    }

    let model_id = query.model.unwrap_or_else(|| state.config.default_model.clone());
    let intent = match query.intent.as_deref() {
        None => Intent::Conversation,
        Some("transcription") => Intent::Transcription,
        Some("conversation") => Intent::Conversation,
        Some(other) => {
            return error::bad_request("invalid_request", format!("unknown intent '{other}'"));
        }
    };

    if state.active_sessions.len() >= state.config.max_sessions {
        return error::service_unavailable(
            "upstream_unavailable",
            "the gateway is at its session capacity",
        );
    }

    let session_id = format!("sess_{}", uuid::Uuid::new_v4().simple());
    state.active_sessions.insert(session_id.clone());

    ws.on_upgrade(move |socket| run_session(socket, state, session_id, model_id, intent))
}

async fn run_session(socket: WebSocket, state: AppState, session_id: String, model_id: String, intent: Intent) {
    let mut config = SessionConfig::default();
    config.intent = intent;

    let orchestrator = Arc::new(ResponseOrchestrator {
        llm: state.collaborators.llm.clone(),
        tts: state.collaborators.tts.clone(),
        deadlines: ResponseDeadlines {
            llm_idle: state.config.llm_idle_timeout(),
            tts: state.config.tts_timeout(),
        },
    });

    let vad = state.collaborators.vad_factory.as_ref().map(|factory| factory());

    let session = Session::new(
        session_id.clone(),
        model_id,
        config,
        state.config.audio_buffer_capacity_bytes(),
        vad,
        state.collaborators.stt.clone(),
        orchestrator,
        state.config.stt_timeout(),
    );

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<SessionSignal>();
    let (sink_tx, sink_rx) = tokio::sync::mpsc::unbounded_channel::<Message>();

    let (mut ws_sink, mut ws_stream) = socket.split();
    let forward_task = tokio::spawn(async move {
        let mut sink_rx = sink_rx;
        while let Some(message) = sink_rx.recv().await {
            if ws_sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let reader_tx = tx.clone();
    let reader_task = tokio::spawn(async move {
        while let Some(message) = ws_stream.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    let _ = reader_tx.send(SessionSignal::ClientText(text.as_bytes().to_vec()));
                }
                Ok(Message::Binary(bytes)) => {
                    let _ = reader_tx.send(SessionSignal::ClientText(bytes.to_vec()));
                }
                Ok(Message::Close(_)) | Err(_) => {
                    let _ = reader_tx.send(SessionSignal::SocketClosed);
                    break;
                }
                Ok(_) => {}
            }
        }
        let _ = reader_tx.send(SessionSignal::SocketClosed);
    });

    let sink = WsEventSink { tx: sink_tx };
    session.run(rx, tx, sink).await;

    reader_task.abort();
    let _ = forward_task.await;
    state.active_sessions.remove(&session_id);
}

struct WsEventSink {
    tx: UnboundedSender<Message>,
}

#[async_trait]
impl EventSink for WsEventSink {
    async fn send(&mut self, text: String) {
        let _ = self.tx.send(Message::Text(text.into()));
    }

    async fn close(&mut self, code: u16, reason: &str) {
        let _ = self.tx.send(Message::Close(Some(axum::extract::ws::CloseFrame {
            code,
            reason: reason.to_string().into(),
        })));
    }
}

pub fn router(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/v1/realtime", axum::routing::get(upgrade_handler))
        .with_state(state)
}
