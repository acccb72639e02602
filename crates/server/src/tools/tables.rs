//! The `list_tables` and `database_info` tools.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use gangway_protocol::{CallToolResult, ToolInfo, ToolSchema};

use crate::executor::CommandExecutor;
use crate::tool::{ToolError, ToolHandler};

pub struct ListTablesTool {
    executor: Arc<dyn CommandExecutor>,
}

impl ListTablesTool {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl ToolHandler for ListTablesTool {
    fn definition(&self) -> ToolInfo {
        ToolInfo {
            name: "list_tables".to_string(),
            description: "List the tables visible to the attached database".to_string(),
            input_schema: ToolSchema::object().to_value(),
        }
    }

    async fn execute(&self, _arguments: Value) -> Result<CallToolResult, ToolError> {
        match self.executor.list_tables().await {
            Ok(tables) => {
                let json = serde_json::to_string(&tables)
                    .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
                Ok(CallToolResult::text(json))
            }
            Err(e) => Ok(CallToolResult::error(e.to_string())),
        }
    }
}

pub struct DatabaseInfoTool {
    executor: Arc<dyn CommandExecutor>,
}

impl DatabaseInfoTool {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl ToolHandler for DatabaseInfoTool {
    fn definition(&self) -> ToolInfo {
        ToolInfo {
            name: "database_info".to_string(),
            description: "Report engine name, version, and connection details".to_string(),
            input_schema: ToolSchema::object().to_value(),
        }
    }

    async fn execute(&self, _arguments: Value) -> Result<CallToolResult, ToolError> {
        match self.executor.database_info().await {
            Ok(info) => Ok(CallToolResult::text(info.to_string())),
            Err(e) => Ok(CallToolResult::error(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{FixtureExecutor, TableData};
    use gangway_protocol::ToolContent;

    fn executor() -> Arc<FixtureExecutor> {
        Arc::new(
            FixtureExecutor::new()
                .with_table("users", TableData::default())
                .with_table("orders", TableData::default()),
        )
    }

    #[tokio::test]
    async fn test_list_tables() {
        let result = ListTablesTool::new(executor())
            .execute(serde_json::json!({}))
            .await
            .unwrap();
        match &result.content[0] {
            ToolContent::Text { text } => {
                let tables: Vec<String> = serde_json::from_str(text).unwrap();
                assert_eq!(tables, vec!["orders", "users"]);
            }
        }
    }

    #[tokio::test]
    async fn test_database_info() {
        let result = DatabaseInfoTool::new(executor())
            .execute(serde_json::json!({}))
            .await
            .unwrap();
        match &result.content[0] {
            ToolContent::Text { text } => {
                let info: Value = serde_json::from_str(text).unwrap();
                assert_eq!(info["engine"], "fixture");
                assert_eq!(info["tables"], 2);
            }
        }
    }
}
