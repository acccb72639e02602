//! Built-in tools.
//!
//! All of them consume the [`CommandExecutor`](crate::executor::CommandExecutor)
//! capability; none runs SQL itself. Each is gated by a config flag and
//! registered by `McpServer::register_builtin_tools`.

pub mod describe;
pub mod execute;
pub mod export;
pub mod query;
pub mod tables;

pub use describe::DescribeTool;
pub use execute::ExecuteTool;
pub use export::ExportTool;
pub use query::QueryTool;
pub use tables::{DatabaseInfoTool, ListTablesTool};

use serde_json::Value;

use crate::tool::ToolError;

/// Extract a required string argument.
pub(crate) fn required_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidInput(format!("'{key}' is required")))
}

/// Extract an optional string argument.
pub(crate) fn optional_str<'a>(arguments: &'a Value, key: &str) -> Option<&'a str> {
    arguments.get(key).and_then(Value::as_str)
}
