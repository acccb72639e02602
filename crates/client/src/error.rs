//! Typed failures surfaced by a client connection.

use gangway_core::SecurityError;
use gangway_protocol::ProtocolError;
use gangway_transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Connection-level failure (refused connection, process exit, socket
    /// reset, timeout). The only retryable category.
    #[error("transport failure: {0}")]
    Transport(TransportError),

    #[error("not initialized: call initialize first")]
    NotInitialized,

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Any other protocol-level error response or malformed payload.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Security(#[from] SecurityError),
}

impl From<TransportError> for ConnectionError {
    fn from(e: TransportError) -> Self {
        match e {
            // Peer bytes that fail to parse are a protocol matter, not a
            // connection failure.
            TransportError::Protocol(p) => Self::from(p),
            other => Self::Transport(other),
        }
    }
}

impl From<ProtocolError> for ConnectionError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::ResourceNotFound(m) => Self::ResourceNotFound(m),
            ProtocolError::ToolNotFound(m) => Self::ToolNotFound(m),
            ProtocolError::AccessDenied(m) => Self::AccessDenied(m),
            other => Self::Protocol(other.to_string()),
        }
    }
}
