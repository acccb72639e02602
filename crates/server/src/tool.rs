//! The tool handler seam.

use async_trait::async_trait;
use serde_json::Value;

use gangway_protocol::{CallToolResult, ToolInfo};

/// Failures a handler reports to the dispatcher.
///
/// `InvalidInput` and `AccessDenied` become JSON-RPC error responses;
/// `ExecutionFailed` becomes an `isError` tool result so the caller sees
/// the failure as tool output rather than a protocol fault.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("access denied: {0}")]
    AccessDenied(String),
}

/// All tools implement this trait. Object-safe, Send + Sync, async.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// The tool's name, description, and input schema.
    fn definition(&self) -> ToolInfo;

    /// Execute with the given JSON arguments.
    async fn execute(&self, arguments: Value) -> Result<CallToolResult, ToolError>;
}
