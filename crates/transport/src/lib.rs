//! MCP transport layer.
//!
//! Defines the [`Transport`] contract for exchanging JSON-RPC messages and
//! provides the concrete channels:
//!
//! - **subprocess**: spawn a server child process, one JSON message per
//!   line over its stdio pipes
//! - **stdio**: serve over this process's own stdin/stdout (the child end
//!   of a subprocess attachment)
//! - **http / http_server**: client and server sides of JSON-RPC over HTTP
//! - **channel**: in-process queue pair for deterministic testing

use std::time::Duration;

use async_trait::async_trait;

use gangway_protocol::{Message, ProtocolError, RpcId};

pub mod channel;
pub mod http;
pub mod http_server;
pub mod stdio;
pub mod subprocess;

pub use channel::ChannelTransport;
pub use http::HttpClientTransport;
pub use http_server::{HttpServerTransport, RequestHandler};
pub use stdio::StdioTransport;
pub use subprocess::SubprocessTransport;

/// Errors raised by the transport layer.
///
/// These are connection-level failures, distinct from protocol-level error
/// responses; they are the only category eligible for retry.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport not connected")]
    NotConnected,

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// The peer closed the channel (EOF, process exit, socket reset).
    #[error("transport closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("HTTP error: {0}")]
    Http(String),

    /// The peer sent bytes that do not parse as a JSON-RPC message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Uniform contract over the byte-level channels carrying JSON-RPC
/// messages.
///
/// `send`/`receive` take `&self`: implementations guard their I/O halves
/// internally, and [`Transport::send_and_receive`] holds that guard across
/// the whole exchange so one in-flight exchange per channel is enforced.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the channel. Idempotent when already connected.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Tear the channel down, releasing any owned process or socket.
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    /// Write one message to the channel.
    async fn send(&self, message: &Message) -> Result<(), TransportError>;

    /// Read the next message, blocking until one arrives, the channel
    /// closes, or the implementation's timeout elapses.
    async fn receive(&self) -> Result<Message, TransportError>;

    /// One request/response exchange, mutually exclusive with any other
    /// exchange on this instance.
    async fn send_and_receive(&self, message: &Message) -> Result<Message, TransportError>;

    /// Liveness probe. The default sends a `ping` request and accepts any
    /// non-error response.
    async fn ping(&self) -> bool {
        if !self.is_connected() {
            return false;
        }
        let ping = Message::request(RpcId::Number(0), "ping", None);
        match self.send_and_receive(&ping).await {
            Ok(Message::Response(resp)) => !resp.is_error(),
            _ => false,
        }
    }

    /// Human-readable endpoint description for logs.
    fn connection_info(&self) -> String;
}

impl TransportError {
    /// Whether this failure is transient enough to retry (connection-level
    /// trouble, not a protocol verdict).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Timeout(_) | Self::Closed | Self::Http(_)
        )
    }
}
