//! MCP client: drives one transport through the initialize handshake and
//! exposes the list/call/read operations of an attached server.

pub mod connection;
pub mod error;

pub use connection::{Connection, ConnectionState, NegotiatedCapabilities, RetryPolicy};
pub use error::ConnectionError;
