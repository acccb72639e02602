//! The `export` tool: inline rendering or write-to-file.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use gangway_core::OutputFormat;
use gangway_protocol::{CallToolResult, ToolInfo, ToolSchema};

use crate::executor::{CommandExecutor, StatementKind};
use crate::format::format_table;
use crate::tool::{ToolError, ToolHandler};
use crate::tools::{optional_str, required_str};

pub struct ExportTool {
    executor: Arc<dyn CommandExecutor>,
    default_format: OutputFormat,
}

impl ExportTool {
    pub fn new(executor: Arc<dyn CommandExecutor>, default_format: OutputFormat) -> Self {
        Self {
            executor,
            default_format,
        }
    }

    async fn export_inline_format(
        &self,
        sql: &str,
        format: OutputFormat,
        output: Option<&str>,
    ) -> Result<CallToolResult, ToolError> {
        let data = match self.executor.query(sql).await {
            Ok(data) => data,
            Err(e) => return Ok(CallToolResult::error(e.to_string())),
        };
        let rendered = format_table(&data, format);
        match output {
            Some(path) => {
                tokio::fs::write(path, rendered.as_bytes())
                    .await
                    .map_err(|e| ToolError::ExecutionFailed(format!("write {path}: {e}")))?;
                Ok(CallToolResult::text(format!("Data exported to {path}")))
            }
            None => Ok(CallToolResult::text(rendered)),
        }
    }
}

#[async_trait]
impl ToolHandler for ExportTool {
    fn definition(&self) -> ToolInfo {
        ToolInfo {
            name: "export".to_string(),
            description: "Export a query result inline or to a file".to_string(),
            input_schema: ToolSchema::object()
                .property("query", "string", "The query whose result to export")
                .property(
                    "format",
                    "string",
                    "json, csv, markdown, or an engine-native format",
                )
                .property("output", "string", "Destination file path; omit for inline")
                .required("query")
                .to_value(),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult, ToolError> {
        let sql = required_str(&arguments, "query")?;
        let output = optional_str(&arguments, "output").filter(|s| !s.is_empty());
        let format_name = optional_str(&arguments, "format");

        if StatementKind::classify(sql) != StatementKind::Query {
            return Err(ToolError::AccessDenied(
                "export tool only runs read-only statements".to_string(),
            ));
        }

        match format_name.map(OutputFormat::parse) {
            // Inline-capable format, or none given: render ourselves.
            Some(Some(format)) => self.export_inline_format(sql, format, output).await,
            None => self.export_inline_format(sql, self.default_format, output).await,
            // Anything else (e.g. parquet) is the engine's business, and
            // only makes sense with a destination file.
            Some(None) => {
                let format = format_name.unwrap_or_default();
                let Some(path) = output else {
                    return Err(ToolError::InvalidInput(format!(
                        "format '{format}' requires an 'output' path"
                    )));
                };
                match self
                    .executor
                    .export_native(sql, format, Path::new(path))
                    .await
                {
                    Ok(()) => Ok(CallToolResult::text(format!("Data exported to {path}"))),
                    Err(e) => Ok(CallToolResult::error(e.to_string())),
                }
            }
        }
    }
}
