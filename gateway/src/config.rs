//! Gateway bootstrap configuration.

use std::time::Duration;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "realtime-gateway", about = "Realtime speech-conversation gateway")]
pub struct GatewayConfig {
    /// Address to bind the HTTP/WebSocket listener to.
    #[arg(long, env = "REALTIME_GATEWAY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the HTTP/WebSocket listener to.
    #[arg(long, env = "REALTIME_GATEWAY_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Default chat-completion model id used when a session doesn't pick one.
    #[arg(long, env = "REALTIME_GATEWAY_DEFAULT_MODEL", default_value = "gateway-llm")]
    pub default_model: String,

    /// Default speech-to-text model id.
    #[arg(long, env = "REALTIME_GATEWAY_DEFAULT_STT_MODEL", default_value = "whisper-1")]
    pub default_stt_model: String,

    /// Bearer token required on `Authorization` for the WebSocket upgrade.
    /// When unset, no authentication is enforced.
    #[arg(long, env = "REALTIME_GATEWAY_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Maximum number of concurrently open sessions.
    #[arg(long, env = "REALTIME_GATEWAY_MAX_SESSIONS", default_value_t = 1024)]
    pub max_sessions: usize,

    /// Input-audio buffer capacity, in seconds of audio, before an append
    /// fails with `input_audio_buffer_overrun`.
    #[arg(long, env = "REALTIME_GATEWAY_AUDIO_BUFFER_SECONDS", default_value_t = 30)]
    pub audio_buffer_capacity_seconds: u32,

    /// Speech-to-text call deadline, in seconds.
    #[arg(long, env = "REALTIME_GATEWAY_STT_TIMEOUT_SECS", default_value_t = 30)]
    pub stt_timeout_secs: u64,

    /// Maximum gap, in seconds, between consecutive LLM stream deltas
    /// before the call is treated as timed out.
    #[arg(long, env = "REALTIME_GATEWAY_LLM_IDLE_TIMEOUT_SECS", default_value_t = 20)]
    pub llm_idle_timeout_secs: u64,

    /// Text-to-speech synthesis deadline, in seconds.
    #[arg(long, env = "REALTIME_GATEWAY_TTS_TIMEOUT_SECS", default_value_t = 15)]
    pub tts_timeout_secs: u64,

    /// Default server-VAD speech-probability threshold.
    #[arg(long, env = "REALTIME_GATEWAY_VAD_THRESHOLD", default_value_t = 0.5)]
    pub vad_threshold: f32,

    /// Default server-VAD leading padding, in milliseconds.
    #[arg(long, env = "REALTIME_GATEWAY_VAD_PREFIX_MS", default_value_t = 300)]
    pub vad_prefix_ms: u32,

    /// Default server-VAD trailing silence before a turn is cut, in milliseconds.
    #[arg(long, env = "REALTIME_GATEWAY_VAD_SILENCE_MS", default_value_t = 500)]
    pub vad_silence_ms: u32,
}

impl GatewayConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn stt_timeout(&self) -> Duration {
        Duration::from_secs(self.stt_timeout_secs)
    }

    pub fn llm_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_idle_timeout_secs)
    }

    pub fn tts_timeout(&self) -> Duration {
        Duration::from_secs(self.tts_timeout_secs)
    }

    pub fn audio_buffer_capacity_bytes(&self) -> usize {
        // 16-bit mono PCM @ 24kHz => 48,000 bytes/sec.
        const BYTES_PER_SECOND: usize = 24_000 * 2;
        self.audio_buffer_capacity_seconds as usize * BYTES_PER_SECOND
    }
}
