//! The gateway's internal error taxonomy.

use conversation_protocol::server_events::ErrorKind;
use thiserror::Error;

/// Every fallible operation in the Conversation Log, Input-Audio Buffer,
/// and Session actor returns this. The session loop converts an `Err`
/// into an `error` server event rather than propagating — the session
/// stays open.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid item: {0}")]
    InvalidItem(String),
    #[error("item not found: {0}")]
    ItemNotFound(String),
    #[error("item referenced by active response: {0}")]
    ItemReferenced(String),
    #[error("a response is already active: {0}")]
    ResponseAlreadyActive(String),
    #[error("unsupported for this session's intent: {0}")]
    UnsupportedIntent(String),
    #[error("input audio buffer overrun: {0}")]
    InputAudioBufferOverrun(String),
    #[error("upstream collaborator unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("upstream call timed out: {0}")]
    UpstreamTimeout(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Codec(#[from] conversation_protocol::codec::CodecError),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) | Self::Codec(_) => ErrorKind::InvalidRequest,
            Self::InvalidItem(_) => ErrorKind::InvalidItem,
            Self::ItemNotFound(_) => ErrorKind::ItemNotFound,
            Self::ItemReferenced(_) => ErrorKind::ItemReferenced,
            Self::ResponseAlreadyActive(_) => ErrorKind::ResponseAlreadyActive,
            Self::UnsupportedIntent(_) => ErrorKind::UnsupportedIntent,
            Self::InputAudioBufferOverrun(_) => ErrorKind::InputAudioBufferOverrun,
            Self::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            Self::UpstreamTimeout(_) => ErrorKind::UpstreamTimeout,
            Self::RateLimited(_) => ErrorKind::RateLimited,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind().as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_to_wire_code() {
        let err = GatewayError::ResponseAlreadyActive("resp_1".into());
        assert_eq!(err.code(), "response_already_active");
    }
}
