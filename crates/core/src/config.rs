use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ── Top-level config ──────────────────────────────────────────

/// Configuration consumed by the MCP engine.
///
/// Loading (file/env/CLI) is a host concern; this crate only fixes the
/// shape. Every field has a serde default so a partial JSON object is
/// accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    pub server_name: Option<String>,
    pub tools: ToolFlags,
    pub default_format: OutputFormat,
    pub limits: Limits,
    pub transport: TransportConfig,
}

impl McpConfig {
    /// Return a redacted view safe for logs and API responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "server_name": self.server_name,
            "tools": self.tools,
            "default_format": self.default_format,
            "limits": self.limits,
            "transport": self.transport.redacted_summary(),
        })
    }
}

// ── Built-in tool gating ──────────────────────────────────────

/// Per-tool enable flags. `execute` is the only one off by default:
/// it is the write path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolFlags {
    pub enable_query: bool,
    pub enable_describe: bool,
    pub enable_list_tables: bool,
    pub enable_database_info: bool,
    pub enable_export: bool,
    pub enable_execute: bool,
    /// Statement kinds the `execute` tool may run, lowercase
    /// (e.g. "ddl", "dml"). Kinds outside this list are denied.
    pub execute_allowed_kinds: Vec<String>,
}

impl Default for ToolFlags {
    fn default() -> Self {
        Self {
            enable_query: true,
            enable_describe: true,
            enable_list_tables: true,
            enable_database_info: true,
            enable_export: true,
            enable_execute: false,
            execute_allowed_kinds: vec!["ddl".to_string(), "dml".to_string()],
        }
    }
}

// ── Output format ─────────────────────────────────────────────

/// Inline rendering format for tabular tool results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
    Markdown,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            "markdown" | "md" => Some(Self::Markdown),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv",
            Self::Markdown => "text/markdown",
        }
    }
}

// ── Limits ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Upper bound on items returned per list page.
    pub max_page_size: usize,
    /// Per-request handling timeout, milliseconds.
    pub request_timeout_ms: u64,
    /// Concurrent connections accepted by a network-facing transport.
    pub max_connections: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_page_size: 100,
            request_timeout_ms: 30_000,
            max_connections: 16,
        }
    }
}

impl Limits {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// ── Transport ─────────────────────────────────────────────────

/// One variant per transport kind. Tagged so a JSON config reads
/// `{"kind": "http", "port": 8650, ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    Subprocess(SubprocessConfig),
    Http(HttpConfig),
    InProcess,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::InProcess
    }
}

impl TransportConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Subprocess(_) => "subprocess",
            Self::Http(_) => "http",
            Self::InProcess => "in_process",
        }
    }

    fn redacted_summary(&self) -> serde_json::Value {
        match self {
            Self::Subprocess(c) => serde_json::json!({
                "kind": "subprocess",
                "command": c.command,
                "args": c.args,
            }),
            Self::Http(c) => serde_json::json!({
                "kind": "http",
                "host": c.host,
                "port": c.port,
                "auth": c.auth_token.is_some(),
                "tls": c.is_tls(),
                "cors_origins": c.cors_origins,
            }),
            Self::InProcess => serde_json::json!({ "kind": "in_process" }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubprocessConfig {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
    /// Per-exchange read timeout, milliseconds.
    pub timeout_ms: u64,
}

impl Default for SubprocessConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            cwd: None,
            env: HashMap::new(),
            timeout_ms: 30_000,
        }
    }
}

impl SubprocessConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
    pub auth_token: Option<String>,
    /// Origins allowed for CORS. Empty means no CORS headers at all.
    pub cors_origins: Vec<String>,
    /// Client-side request timeout, milliseconds.
    pub timeout_ms: u64,
    /// Client-side retry count for transport-level failures.
    pub retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8650,
            tls_cert_path: None,
            tls_key_path: None,
            auth_token: None,
            cors_origins: Vec::new(),
            timeout_ms: 30_000,
            retries: 0,
        }
    }
}

impl HttpConfig {
    pub fn is_tls(&self) -> bool {
        self.tls_cert_path.is_some() || self.tls_key_path.is_some()
    }

    pub fn base_url(&self) -> String {
        let scheme = if self.is_tls() { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
