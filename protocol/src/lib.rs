//! Wire protocol types for the realtime speech-conversation gateway.
//!
//! This crate defines the JSON event protocol spoken over the gateway's
//! WebSocket connection: the domain types for sessions, conversation items,
//! and responses, the client/server event enums, and the codec that
//! serializes/deserializes them.
//!
//! The crate has no async runtime or I/O dependency — it is pure data plus
//! (de)serialization, mirroring how `openai-protocol` is kept independent of
//! the gateway's execution model.

pub mod client_events;
pub mod codec;
pub mod conversation;
pub mod response;
pub mod server_events;
pub mod session;

pub use client_events::RealtimeClientEvent;
pub use codec::{CodecError, decode_client_event, encode_server_event};
pub use conversation::{ContentPart, ConversationItem, ItemStatus, Role};
pub use response::{Response, ResponseConfig, ResponseError, ResponseStatus, ResponseUsage};
pub use server_events::{ApiError, ErrorKind, RealtimeServerEvent};
pub use session::{
    AudioFormat, Intent, MaxResponseOutputTokens, Modality, Session, SessionConfig,
    SessionConfigPatch, ToolChoice, ToolDefinition, TurnDetection, Voice,
};
