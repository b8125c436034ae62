//! JSON (de)serialization at the WebSocket boundary.
//!
//! A malformed or unrecognized client message never propagates as a Rust
//! panic or a closed connection — the caller turns a [`CodecError`] into an
//! `error` server event and keeps the session open, per the gateway's error
//! taxonomy.

use thiserror::Error;

use crate::client_events::RealtimeClientEvent;
use crate::server_events::RealtimeServerEvent;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed client event: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("client event is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

pub fn decode_client_event(payload: &[u8]) -> Result<RealtimeClientEvent, CodecError> {
    let text = std::str::from_utf8(payload)?;
    Ok(serde_json::from_str(text)?)
}

pub fn encode_server_event(event: &RealtimeServerEvent) -> Result<String, CodecError> {
    Ok(serde_json::to_string(event)?)
}
