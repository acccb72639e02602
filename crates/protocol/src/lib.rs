//! MCP (Model Context Protocol) wire format.
//!
//! Implements JSON-RPC 2.0 message parsing/serialization, the MCP method
//! payload types, the protocol error taxonomy, and cursor-based pagination.
//!
//! # Architecture
//!
//! - **message**: JSON-RPC 2.0 message enum, classification, codec
//! - **types**: MCP method payloads (initialize, tools, resources, prompts)
//! - **error**: error taxonomy mapped to JSON-RPC error codes
//! - **pagination**: opaque cursors and page-walk helpers

pub mod error;
pub mod message;
pub mod pagination;
pub mod types;

pub use error::{error_codes, sanitize_detail, ProtocolError};
pub use message::{Message, Notification, Request, Response, RpcError, RpcId, JSONRPC_VERSION};
pub use pagination::{decode_cursor, encode_cursor, paginate, parse_page, PageResult};
pub use types::*;
