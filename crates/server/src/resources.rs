//! Content-producing resource providers.
//!
//! A registered resource pairs a URI with a provider capability:
//! static text, a one-shot query snapshot, a live query (optionally
//! cached for a refresh interval), or a query template bound at
//! registration time.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, OnceCell};

use gangway_core::OutputFormat;
use gangway_protocol::ResourceInfo;

use crate::executor::CommandExecutor;
use crate::format::format_table;
use crate::prompts::substitute;

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("resource unavailable: {0}")]
    Unavailable(String),
}

/// When cached content goes stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Re-read on every access.
    #[default]
    None,
    /// Serve cached content until the interval elapses.
    Interval(Duration),
}

#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Produce the current content text.
    async fn read(&self) -> Result<String, ResourceError>;

    fn mime_type(&self) -> String;

    fn description(&self) -> String;

    /// Known size in bytes, when content is fixed.
    fn size_hint(&self) -> Option<u64> {
        None
    }
}

/// A registry entry: URI plus the provider producing its content.
pub struct ResourceEntry {
    pub uri: String,
    pub name: String,
    pub provider: Arc<dyn ResourceProvider>,
}

impl ResourceEntry {
    pub fn new(uri: impl Into<String>, provider: Arc<dyn ResourceProvider>) -> Self {
        let uri = uri.into();
        Self {
            name: uri.clone(),
            uri,
            provider,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn info(&self) -> ResourceInfo {
        ResourceInfo {
            uri: self.uri.clone(),
            name: self.name.clone(),
            description: Some(self.provider.description()),
            mime_type: Some(self.provider.mime_type()),
            size: self.provider.size_hint(),
        }
    }
}

// ── Static ──────────────────────────────────────────────────────────

/// Fixed content known at registration time.
pub struct StaticResource {
    content: String,
    mime_type: String,
    description: String,
}

impl StaticResource {
    pub fn new(
        content: impl Into<String>,
        mime_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            mime_type: mime_type.into(),
            description: description.into(),
        }
    }
}

#[async_trait]
impl ResourceProvider for StaticResource {
    async fn read(&self) -> Result<String, ResourceError> {
        Ok(self.content.clone())
    }

    fn mime_type(&self) -> String {
        self.mime_type.clone()
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.content.len() as u64)
    }
}

// ── Snapshot ────────────────────────────────────────────────────────

/// Captures a query result once, on first read, then serves the capture
/// forever.
pub struct SnapshotResource {
    executor: Arc<dyn CommandExecutor>,
    sql: String,
    format: OutputFormat,
    capture: OnceCell<String>,
}

impl SnapshotResource {
    pub fn new(executor: Arc<dyn CommandExecutor>, sql: impl Into<String>, format: OutputFormat) -> Self {
        Self {
            executor,
            sql: sql.into(),
            format,
            capture: OnceCell::new(),
        }
    }
}

#[async_trait]
impl ResourceProvider for SnapshotResource {
    async fn read(&self) -> Result<String, ResourceError> {
        let content = self
            .capture
            .get_or_try_init(|| async {
                let data = self
                    .executor
                    .query(&self.sql)
                    .await
                    .map_err(|e| ResourceError::Unavailable(e.to_string()))?;
                Ok::<_, ResourceError>(format_table(&data, self.format))
            })
            .await?;
        Ok(content.clone())
    }

    fn mime_type(&self) -> String {
        self.format.mime_type().to_string()
    }

    fn description(&self) -> String {
        format!("query snapshot ({})", self.format.mime_type())
    }
}

// ── Live ────────────────────────────────────────────────────────────

/// Runs its query per read; with an interval policy, serves cached
/// content until stale.
pub struct LiveResource {
    executor: Arc<dyn CommandExecutor>,
    sql: String,
    format: OutputFormat,
    refresh: RefreshPolicy,
    cache: Mutex<Option<(Instant, String)>>,
}

impl LiveResource {
    pub fn new(executor: Arc<dyn CommandExecutor>, sql: impl Into<String>, format: OutputFormat) -> Self {
        Self {
            executor,
            sql: sql.into(),
            format,
            refresh: RefreshPolicy::None,
            cache: Mutex::new(None),
        }
    }

    pub fn with_refresh(mut self, refresh: RefreshPolicy) -> Self {
        self.refresh = refresh;
        self
    }

    async fn run_query(&self) -> Result<String, ResourceError> {
        let data = self
            .executor
            .query(&self.sql)
            .await
            .map_err(|e| ResourceError::Unavailable(e.to_string()))?;
        Ok(format_table(&data, self.format))
    }
}

#[async_trait]
impl ResourceProvider for LiveResource {
    async fn read(&self) -> Result<String, ResourceError> {
        let interval = match self.refresh {
            RefreshPolicy::None => return self.run_query().await,
            RefreshPolicy::Interval(interval) => interval,
        };
        let mut cache = self.cache.lock().await;
        if let Some((at, content)) = cache.as_ref() {
            if at.elapsed() < interval {
                return Ok(content.clone());
            }
        }
        let content = self.run_query().await?;
        *cache = Some((Instant::now(), content.clone()));
        Ok(content)
    }

    fn mime_type(&self) -> String {
        self.format.mime_type().to_string()
    }

    fn description(&self) -> String {
        match self.refresh {
            RefreshPolicy::None => format!("live query ({})", self.format.mime_type()),
            RefreshPolicy::Interval(interval) => {
                format!(
                    "live query ({}, refresh {}s)",
                    self.format.mime_type(),
                    interval.as_secs()
                )
            }
        }
    }
}

// ── Templated ───────────────────────────────────────────────────────

/// A query template whose `{placeholders}` were bound at registration;
/// renders and runs per read.
pub struct TemplatedResource {
    executor: Arc<dyn CommandExecutor>,
    template: String,
    bindings: BTreeMap<String, String>,
    format: OutputFormat,
}

impl TemplatedResource {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        template: impl Into<String>,
        bindings: BTreeMap<String, String>,
        format: OutputFormat,
    ) -> Self {
        Self {
            executor,
            template: template.into(),
            bindings,
            format,
        }
    }
}

#[async_trait]
impl ResourceProvider for TemplatedResource {
    async fn read(&self) -> Result<String, ResourceError> {
        let sql = substitute(&self.template, &self.bindings);
        let data = self
            .executor
            .query(&sql)
            .await
            .map_err(|e| ResourceError::Unavailable(e.to_string()))?;
        Ok(format_table(&data, self.format))
    }

    fn mime_type(&self) -> String {
        self.format.mime_type().to_string()
    }

    fn description(&self) -> String {
        format!("templated query ({})", self.format.mime_type())
    }
}
