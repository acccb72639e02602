//! Error taxonomy for the protocol crate.

use crate::message::RpcError;

/// Standard JSON-RPC 2.0 error codes plus the MCP-specific range.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    pub const RESOURCE_NOT_FOUND: i64 = -32001;
    pub const TOOL_NOT_FOUND: i64 = -32002;
    pub const INVALID_TOOL_INPUT: i64 = -32003;
    pub const ACCESS_DENIED: i64 = -32004;
}

/// Errors that can occur while parsing, dispatching, or answering MCP
/// messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Text was not valid JSON-RPC 2.0.
    #[error("parse error: {0}")]
    Parse(String),

    /// A structurally valid JSON object that is not a usable message.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("access denied: {0}")]
    AccessDenied(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl ProtocolError {
    /// JSON-RPC error code for this error.
    pub fn code(&self) -> i64 {
        match self {
            Self::Parse(_) => error_codes::PARSE_ERROR,
            Self::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            Self::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => error_codes::INVALID_PARAMS,
            Self::Internal(_) => error_codes::INTERNAL_ERROR,
            Self::ResourceNotFound(_) => error_codes::RESOURCE_NOT_FOUND,
            Self::ToolNotFound(_) => error_codes::TOOL_NOT_FOUND,
            Self::InvalidToolInput(_) => error_codes::INVALID_TOOL_INPUT,
            Self::AccessDenied(_) => error_codes::ACCESS_DENIED,
        }
    }

    /// Convert to a JSON-RPC error object with sanitized detail text.
    pub fn to_rpc_error(&self) -> RpcError {
        RpcError {
            code: self.code(),
            message: sanitize_detail(&self.to_string()),
            data: None,
        }
    }
}

const MAX_DETAIL_LEN: usize = 500;

/// Sanitize internal error detail before it becomes client-visible:
/// control characters are collapsed to spaces and the text is truncated.
/// JSON string escaping is handled by the serializer; this guards against
/// leaking multi-line internals and oversized payloads.
pub fn sanitize_detail(detail: &str) -> String {
    let mut out = String::with_capacity(detail.len().min(MAX_DETAIL_LEN + 3));
    for c in detail.chars() {
        if out.len() >= MAX_DETAIL_LEN {
            out.push_str("...");
            break;
        }
        out.push(if c.is_control() { ' ' } else { c });
    }
    out
}
