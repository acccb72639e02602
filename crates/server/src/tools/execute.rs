//! The `execute` tool: DDL/DML, disabled by default.
//!
//! Every statement is classified server-side from its text; a
//! caller-supplied "kind" would be an attack surface, so none is
//! accepted. Kinds outside the explicit allow-list are denied, which
//! means a newly introduced statement kind is denied by default.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use gangway_protocol::{CallToolResult, ToolInfo, ToolSchema};

use crate::executor::{CommandExecutor, StatementKind};
use crate::tool::{ToolError, ToolHandler};
use crate::tools::required_str;

pub struct ExecuteTool {
    executor: Arc<dyn CommandExecutor>,
    allowed_kinds: Vec<StatementKind>,
}

impl ExecuteTool {
    pub fn new(executor: Arc<dyn CommandExecutor>, allowed_kinds: Vec<StatementKind>) -> Self {
        Self {
            executor,
            allowed_kinds,
        }
    }
}

#[async_trait]
impl ToolHandler for ExecuteTool {
    fn definition(&self) -> ToolInfo {
        ToolInfo {
            name: "execute".to_string(),
            description: "Execute a DDL/DML statement".to_string(),
            input_schema: ToolSchema::object()
                .property("sql", "string", "The statement to execute")
                .required("sql")
                .to_value(),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult, ToolError> {
        let sql = required_str(&arguments, "sql")?;
        let kind = StatementKind::classify(sql);
        if !self.allowed_kinds.contains(&kind) {
            return Err(ToolError::AccessDenied(format!(
                "statement kind '{}' is not in the execute allow-list",
                kind.as_str()
            )));
        }
        match self.executor.execute(sql).await {
            Ok(rows) => Ok(CallToolResult::text(format!("OK: {rows} rows affected"))),
            Err(e) => Ok(CallToolResult::error(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::FixtureExecutor;

    fn tool_with(kinds: Vec<StatementKind>) -> (Arc<FixtureExecutor>, ExecuteTool) {
        let executor = Arc::new(FixtureExecutor::new());
        let tool = ExecuteTool::new(Arc::clone(&executor) as Arc<dyn CommandExecutor>, kinds);
        (executor, tool)
    }

    #[tokio::test]
    async fn test_allowed_ddl_executes() {
        let (executor, tool) = tool_with(vec![StatementKind::Ddl, StatementKind::Dml]);
        let result = tool
            .execute(serde_json::json!({"sql": "CREATE TABLE t (a int)"}))
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(executor.executed_statements().len(), 1);
    }

    #[tokio::test]
    async fn test_kind_outside_allowlist_denied() {
        let (executor, tool) = tool_with(vec![StatementKind::Dml]);
        let err = tool
            .execute(serde_json::json!({"sql": "DROP TABLE t"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::AccessDenied(_)));
        assert!(executor.executed_statements().is_empty());
    }

    #[tokio::test]
    async fn test_unclassified_statement_denied_by_default() {
        // A file-copy statement is neither DML nor DDL; it must not slip
        // through a {ddl, dml} allow-list.
        let (executor, tool) = tool_with(vec![StatementKind::Ddl, StatementKind::Dml]);
        let err = tool
            .execute(serde_json::json!({"sql": "COPY t TO '/etc/passwd'"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::AccessDenied(_)));
        assert!(executor.executed_statements().is_empty());
    }

    #[tokio::test]
    async fn test_caller_supplied_kind_ignored() {
        // An extra "kind" argument must not override server-side
        // classification.
        let (executor, tool) = tool_with(vec![StatementKind::Dml]);
        let err = tool
            .execute(serde_json::json!({"sql": "DROP TABLE t", "kind": "dml"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::AccessDenied(_)));
        assert!(executor.executed_statements().is_empty());
    }
}
