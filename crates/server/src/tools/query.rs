//! The `query` tool: run a read-only statement and format the rows.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use gangway_core::OutputFormat;
use gangway_protocol::{CallToolResult, ToolInfo, ToolSchema};

use crate::executor::{CommandExecutor, StatementKind};
use crate::format::format_table;
use crate::tool::{ToolError, ToolHandler};
use crate::tools::{optional_str, required_str};

pub struct QueryTool {
    executor: Arc<dyn CommandExecutor>,
    default_format: OutputFormat,
}

impl QueryTool {
    pub fn new(executor: Arc<dyn CommandExecutor>, default_format: OutputFormat) -> Self {
        Self {
            executor,
            default_format,
        }
    }
}

#[async_trait]
impl ToolHandler for QueryTool {
    fn definition(&self) -> ToolInfo {
        ToolInfo {
            name: "query".to_string(),
            description: "Execute a read-only SQL statement and return the rows".to_string(),
            input_schema: ToolSchema::object()
                .property("sql", "string", "The SQL statement to run")
                .property("format", "string", "Output format: json, csv, or markdown")
                .required("sql")
                .to_value(),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult, ToolError> {
        let sql = required_str(&arguments, "sql")?;
        let format = match optional_str(&arguments, "format") {
            Some(name) => OutputFormat::parse(name)
                .ok_or_else(|| ToolError::InvalidInput(format!("unknown format: {name}")))?,
            None => self.default_format,
        };

        // Classified from the text itself; a write statement does not
        // become a query because the caller said so.
        if StatementKind::classify(sql) != StatementKind::Query {
            return Err(ToolError::AccessDenied(
                "query tool only runs read-only statements".to_string(),
            ));
        }

        match self.executor.query(sql).await {
            Ok(data) => Ok(CallToolResult::text(format_table(&data, format))),
            Err(e) => Ok(CallToolResult::error(e.to_string())),
        }
    }
}
