//! The `describe` tool: report column schema without materializing rows.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use gangway_protocol::{CallToolResult, ToolInfo, ToolSchema};

use crate::executor::CommandExecutor;
use crate::tool::{ToolError, ToolHandler};
use crate::tools::optional_str;

pub struct DescribeTool {
    executor: Arc<dyn CommandExecutor>,
}

impl DescribeTool {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl ToolHandler for DescribeTool {
    fn definition(&self) -> ToolInfo {
        ToolInfo {
            name: "describe".to_string(),
            description: "Report the column schema of a table or of an arbitrary query"
                .to_string(),
            // Either 'table' or 'query' is needed; neither alone is
            // required, so the schema declares no required fields.
            input_schema: ToolSchema::object()
                .property("table", "string", "Table to describe")
                .property("query", "string", "Query whose result schema to describe")
                .to_value(),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult, ToolError> {
        let table = optional_str(&arguments, "table").filter(|s| !s.is_empty());
        let query = optional_str(&arguments, "query").filter(|s| !s.is_empty());

        let (subject, columns) = match (table, query) {
            (Some(table), _) => {
                let columns = self.executor.describe_table(table).await;
                (serde_json::json!({ "table": table }), columns)
            }
            (None, Some(query)) => {
                let columns = self.executor.describe_query(query).await;
                (serde_json::json!({ "query": query }), columns)
            }
            (None, None) => {
                return Err(ToolError::InvalidInput(
                    "either 'table' or 'query' is required".to_string(),
                ))
            }
        };

        match columns {
            Ok(columns) => {
                let mut result = subject;
                result["columns"] = serde_json::to_value(&columns)
                    .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
                Ok(CallToolResult::text(result.to_string()))
            }
            Err(e) => Ok(CallToolResult::error(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{FixtureExecutor, TableData};
    use gangway_protocol::ToolContent;

    fn tool() -> DescribeTool {
        let executor = Arc::new(FixtureExecutor::new().with_table(
            "users",
            TableData {
                columns: vec!["id".to_string(), "name".to_string()],
                rows: vec![vec![1.into(), "ada".into()]],
            },
        ));
        DescribeTool::new(executor)
    }

    fn text_of(result: &CallToolResult) -> &str {
        match &result.content[0] {
            ToolContent::Text { text } => text,
        }
    }

    #[tokio::test]
    async fn test_describe_table() {
        let result = tool()
            .execute(serde_json::json!({"table": "users"}))
            .await
            .unwrap();
        let parsed: Value = serde_json::from_str(text_of(&result)).unwrap();
        assert_eq!(parsed["table"], "users");
        assert_eq!(parsed["columns"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["columns"][0]["name"], "id");
        // Schema only: no row data in the output.
        assert!(!text_of(&result).contains("ada"));
    }

    #[tokio::test]
    async fn test_describe_query() {
        let result = tool()
            .execute(serde_json::json!({"query": "SELECT * FROM users"}))
            .await
            .unwrap();
        let parsed: Value = serde_json::from_str(text_of(&result)).unwrap();
        assert!(parsed["query"].is_string());
        assert_eq!(parsed["columns"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_neither_argument_is_invalid() {
        let err = tool().execute(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_unknown_table_is_error_result() {
        let result = tool()
            .execute(serde_json::json!({"table": "missing"}))
            .await
            .unwrap();
        assert!(result.is_error);
    }
}
