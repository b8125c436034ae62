//! `realtime-gateway` binary entry point.

use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use futures::stream::BoxStream;
use realtime_gateway::collaborators::{ChatCompletion, ChatDelta, ChatRequest};
use realtime_gateway::config::GatewayConfig;
use realtime_gateway::error::GatewayError;
use realtime_gateway::version;
use realtime_gateway::ws::{AppState, Collaborators};

/// Placeholder chat-completion client wired in until a concrete provider is
/// configured. Always fails with `upstream_unavailable` rather than
/// fabricating a response.
struct UnconfiguredChatCompletion;

#[async_trait]
impl ChatCompletion for UnconfiguredChatCompletion {
    async fn stream_chat(
        &self,
        _request: ChatRequest,
    ) -> Result<BoxStream<'static, Result<ChatDelta, GatewayError>>, GatewayError> {
        Err(GatewayError::UpstreamUnavailable(
            "no chat-completion backend is configured for this gateway".to_string(),
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = GatewayConfig::parse();
    tracing::info!(version = version::get_version_string(), bind = %config.bind_addr(), "starting realtime-gateway");

    let collaborators = Collaborators {
        llm: Arc::new(UnconfiguredChatCompletion),
        stt: None,
        tts: None,
        vad_factory: None,
    };

    let state = AppState::new(Arc::new(config.clone()), Arc::new(collaborators));

    let app = realtime_gateway::ws::router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
