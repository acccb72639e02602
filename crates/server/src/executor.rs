//! The command executor capability.
//!
//! Built-in tools never run SQL themselves: they consume this trait, and
//! the host supplies the concrete engine. The trait keeps the protocol
//! crate free of any database dependency and makes the tool set swappable.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("query failed: {0}")]
    Query(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

/// Tabular result of a read statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// One column in a schema description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
}

/// Coarse statement classification, derived from the SQL text itself.
///
/// The `execute` tool classifies server-side and never trusts a
/// caller-supplied kind. Anything unrecognized is `Other`, which no
/// default allow-list contains — new statement kinds are denied until
/// someone opts them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Query,
    Ddl,
    Dml,
    Transaction,
    Pragma,
    Other,
}

impl StatementKind {
    /// Classify by the first keyword, skipping whitespace and line
    /// comments.
    pub fn classify(sql: &str) -> Self {
        let mut text = sql.trim_start();
        while let Some(rest) = text.strip_prefix("--") {
            text = match rest.split_once('\n') {
                Some((_, after)) => after.trim_start(),
                None => "",
            };
        }
        let keyword: String = text
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_uppercase();
        match keyword.as_str() {
            "SELECT" | "WITH" | "SHOW" | "DESCRIBE" | "EXPLAIN" | "VALUES" => Self::Query,
            "CREATE" | "ALTER" | "DROP" | "TRUNCATE" => Self::Ddl,
            "INSERT" | "UPDATE" | "DELETE" | "MERGE" => Self::Dml,
            "BEGIN" | "COMMIT" | "ROLLBACK" => Self::Transaction,
            "PRAGMA" | "SET" => Self::Pragma,
            _ => Self::Other,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "query" => Some(Self::Query),
            "ddl" => Some(Self::Ddl),
            "dml" => Some(Self::Dml),
            "transaction" => Some(Self::Transaction),
            "pragma" => Some(Self::Pragma),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Ddl => "ddl",
            Self::Dml => "dml",
            Self::Transaction => "transaction",
            Self::Pragma => "pragma",
            Self::Other => "other",
        }
    }
}

/// The capability the built-in tools are written against.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run a read-only statement and materialize its rows.
    async fn query(&self, sql: &str) -> Result<TableData, ExecutorError>;

    /// Run a DDL/DML statement; returns rows affected.
    async fn execute(&self, sql: &str) -> Result<u64, ExecutorError>;

    /// Column schema of a table, without materializing row data.
    async fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>, ExecutorError>;

    /// Column schema of an arbitrary query, without materializing rows.
    async fn describe_query(&self, sql: &str) -> Result<Vec<ColumnInfo>, ExecutorError>;

    async fn list_tables(&self) -> Result<Vec<String>, ExecutorError>;

    async fn database_info(&self) -> Result<Value, ExecutorError>;

    /// Engine-native export for formats the engine writes better itself
    /// (e.g. columnar files). Inline formats never reach this.
    async fn export_native(
        &self,
        _sql: &str,
        format: &str,
        _path: &Path,
    ) -> Result<(), ExecutorError> {
        Err(ExecutorError::Unsupported(format!(
            "native export to {format} is not supported by this executor"
        )))
    }
}

/// In-memory executor backed by fixed tables. For testing.
#[derive(Default)]
pub struct FixtureExecutor {
    tables: BTreeMap<String, TableData>,
    statements: Mutex<Vec<String>>,
}

impl FixtureExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: impl Into<String>, data: TableData) -> Self {
        self.tables.insert(name.into(), data);
        self
    }

    /// Statements passed to [`CommandExecutor::execute`] so far.
    pub fn executed_statements(&self) -> Vec<String> {
        self.statements
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn table_for_query(&self, sql: &str) -> Result<&TableData, ExecutorError> {
        let lowered = sql.to_ascii_lowercase();
        for (name, data) in &self.tables {
            if lowered.contains(&name.to_ascii_lowercase()) {
                return Ok(data);
            }
        }
        Err(ExecutorError::Query(format!("no fixture matches: {sql}")))
    }
}

#[async_trait]
impl CommandExecutor for FixtureExecutor {
    async fn query(&self, sql: &str) -> Result<TableData, ExecutorError> {
        self.table_for_query(sql).cloned()
    }

    async fn execute(&self, sql: &str) -> Result<u64, ExecutorError> {
        self.statements
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(sql.to_string());
        Ok(1)
    }

    async fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>, ExecutorError> {
        let data = self
            .tables
            .get(table)
            .ok_or_else(|| ExecutorError::NotFound(format!("table {table}")))?;
        Ok(data
            .columns
            .iter()
            .map(|name| ColumnInfo {
                name: name.clone(),
                data_type: "VARCHAR".to_string(),
                nullable: true,
            })
            .collect())
    }

    async fn describe_query(&self, sql: &str) -> Result<Vec<ColumnInfo>, ExecutorError> {
        let data = self.table_for_query(sql)?;
        Ok(data
            .columns
            .iter()
            .map(|name| ColumnInfo {
                name: name.clone(),
                data_type: "VARCHAR".to_string(),
                nullable: true,
            })
            .collect())
    }

    async fn list_tables(&self) -> Result<Vec<String>, ExecutorError> {
        Ok(self.tables.keys().cloned().collect())
    }

    async fn database_info(&self) -> Result<Value, ExecutorError> {
        Ok(serde_json::json!({
            "engine": "fixture",
            "tables": self.tables.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_query_kinds() {
        assert_eq!(StatementKind::classify("SELECT 1"), StatementKind::Query);
        assert_eq!(
            StatementKind::classify("  with t as (select 1) select * from t"),
            StatementKind::Query
        );
        assert_eq!(
            StatementKind::classify("CREATE TABLE t (a int)"),
            StatementKind::Ddl
        );
        assert_eq!(
            StatementKind::classify("insert into t values (1)"),
            StatementKind::Dml
        );
        assert_eq!(StatementKind::classify("BEGIN"), StatementKind::Transaction);
        assert_eq!(
            StatementKind::classify("PRAGMA table_info(t)"),
            StatementKind::Pragma
        );
    }

    #[test]
    fn test_classify_unknown_is_other() {
        // A file-copy statement is neither narrowly DML nor DDL; it must
        // classify as Other so default allow-lists deny it.
        assert_eq!(
            StatementKind::classify("COPY t TO '/tmp/t.csv'"),
            StatementKind::Other
        );
        assert_eq!(
            StatementKind::classify("ATTACH 'x.db'"),
            StatementKind::Other
        );
        assert_eq!(StatementKind::classify(""), StatementKind::Other);
    }

    #[test]
    fn test_classify_skips_comments() {
        assert_eq!(
            StatementKind::classify("-- harmless note\nDROP TABLE t"),
            StatementKind::Ddl
        );
        assert_eq!(StatementKind::classify("-- only a comment"), StatementKind::Other);
    }

    #[test]
    fn test_kind_parse_roundtrip() {
        for kind in [
            StatementKind::Query,
            StatementKind::Ddl,
            StatementKind::Dml,
            StatementKind::Transaction,
            StatementKind::Pragma,
            StatementKind::Other,
        ] {
            assert_eq!(StatementKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(StatementKind::parse("copy"), None);
    }

    #[tokio::test]
    async fn test_fixture_executor() {
        let executor = FixtureExecutor::new().with_table(
            "users",
            TableData {
                columns: vec!["id".to_string(), "name".to_string()],
                rows: vec![vec![1.into(), "ada".into()]],
            },
        );
        let data = executor.query("SELECT * FROM users").await.unwrap();
        assert_eq!(data.rows.len(), 1);
        assert!(executor.query("SELECT * FROM missing").await.is_err());

        executor.execute("CREATE TABLE t (a int)").await.unwrap();
        assert_eq!(executor.executed_statements().len(), 1);

        let cols = executor.describe_table("users").await.unwrap();
        assert_eq!(cols.len(), 2);
        assert_eq!(executor.list_tables().await.unwrap(), vec!["users"]);
    }
}
