//! Internal messages multiplexed onto the session's single event queue
//! (spec §9 "Single-actor-per-session discipline"): decoded client events,
//! VAD edges, and orchestrator output all funnel through here so the
//! session actor is the only place event ordering is decided.

use conversation_protocol::conversation::ConversationItem;
use conversation_protocol::response::ResponseUsage;
use conversation_protocol::server_events::RealtimeServerEvent;

use crate::error::GatewayError;

#[derive(Debug)]
pub enum ResponseOutcome {
    Completed,
    Cancelled,
    Failed(GatewayError),
}

#[derive(Debug)]
pub enum SessionSignal {
    /// A raw client event, decoded by the codec at the socket-read task.
    ClientText(Vec<u8>),
    /// The socket was closed by the peer.
    SocketClosed,
    /// A wire event produced mid-response by the orchestrator, forwarded
    /// to the client verbatim.
    ResponseEvent(RealtimeServerEvent),
    /// A response reached a terminal state; the session appends the
    /// finalized items to the log and clears the active-response slot.
    ResponseFinalized {
        response_id: String,
        outcome: ResponseOutcome,
        items: Vec<ConversationItem>,
        usage: Option<ResponseUsage>,
    },
    /// STT finished transcribing a committed audio region.
    TranscriptionCompleted {
        item_id: String,
        content_index: u32,
        transcript: String,
    },
    TranscriptionFailed {
        item_id: String,
        content_index: u32,
        error: GatewayError,
    },
}
