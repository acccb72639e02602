//! The MCP server: lifecycle, dispatch table, per-transport loops.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use gangway_core::{McpConfig, SecurityPolicy, TransportConfig};
use gangway_protocol::pagination::paginate;
use gangway_protocol::types::methods;
use gangway_protocol::{
    sanitize_detail, CallToolParams, GetPromptParams, InitializeResult, ListPromptsResult,
    ListResourcesResult, ListToolsResult, Message, Notification, PromptsCapability,
    ProtocolError, ReadResourceResult, Request, ResourceContents, ResourcesCapability, Response,
    RpcId, ServerCapabilities, ServerInfo, ToolInfo, ToolsCapability, JSONRPC_VERSION,
    PROTOCOL_VERSION,
};
use gangway_transport::{
    HttpServerTransport, RequestHandler, StdioTransport, Transport, TransportError,
};

use crate::executor::{CommandExecutor, StatementKind};
use crate::pending::{PendingRegistration, RegistrationQueue};
use crate::prompts::PromptTemplate;
use crate::registry::{Registry, RegistryError};
use crate::resources::ResourceEntry;
use crate::stats::{ServerStats, ServerStatus};
use crate::tool::{ToolError, ToolHandler};
use crate::tools::{DatabaseInfoTool, DescribeTool, ExecuteTool, ExportTool, ListTablesTool, QueryTool};

pub type ToolRegistry = Registry<dyn ToolHandler>;
pub type ResourceRegistry = Registry<ResourceEntry>;
pub type PromptRegistry = Registry<PromptTemplate>;

/// Server lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("server is already running")]
    AlreadyRunning,

    #[error("MCP serving is disabled by security policy")]
    ServingDisabled,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// An MCP server instance: registries, dispatcher, and execution loops.
///
/// Registries are guarded for structural access only; handler execution
/// happens after the lock is released, so one slow tool call does not
/// serialize unrelated calls.
pub struct McpServer {
    config: McpConfig,
    server_name: String,
    server_version: String,
    security: SecurityPolicy,
    tools: ToolRegistry,
    resources: ResourceRegistry,
    prompts: PromptRegistry,
    pending: Option<RegistrationQueue>,
    stats: ServerStats,
    initialized: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
    started_at: Mutex<Option<Instant>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    http: tokio::sync::Mutex<Option<HttpServerTransport>>,
}

impl McpServer {
    pub fn new(config: McpConfig) -> Self {
        let server_name = config
            .server_name
            .clone()
            .unwrap_or_else(|| "gangway".to_string());
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            server_name,
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            security: SecurityPolicy::new(),
            tools: Registry::new(),
            resources: Registry::new(),
            prompts: Registry::new(),
            pending: None,
            stats: ServerStats::default(),
            initialized: AtomicBool::new(false),
            lifecycle: Mutex::new(Lifecycle::Stopped),
            started_at: Mutex::new(None),
            shutdown_tx,
            tasks: tokio::sync::Mutex::new(Vec::new()),
            http: tokio::sync::Mutex::new(None),
        }
    }

    /// Share a security policy with the rest of the process.
    pub fn with_security(mut self, policy: SecurityPolicy) -> Self {
        self.security = policy;
        self
    }

    /// Adopt a queue of registrations issued before this server existed;
    /// they are flushed, in order, when the server starts.
    pub fn with_pending(mut self, queue: RegistrationQueue) -> Self {
        self.pending = Some(queue);
        self
    }

    pub fn name(&self) -> &str {
        &self.server_name
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lock_lifecycle()
    }

    /// Whether any client has completed the initialize handshake.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    // ── Registration ────────────────────────────────────────────────

    pub fn register_tool(&self, handler: Arc<dyn ToolHandler>) -> Result<(), RegistryError> {
        let name = handler.definition().name;
        self.tools.register(name, handler)
    }

    pub fn unregister_tool(&self, name: &str) -> bool {
        self.tools.unregister(name)
    }

    pub fn publish_resource(&self, entry: ResourceEntry) -> Result<(), RegistryError> {
        let uri = entry.uri.clone();
        self.resources.register(uri, Arc::new(entry))
    }

    pub fn unpublish_resource(&self, uri: &str) -> bool {
        self.resources.unregister(uri)
    }

    pub fn register_prompt(&self, template: PromptTemplate) -> Result<(), RegistryError> {
        let name = template.name.clone();
        self.prompts.register(name, Arc::new(template))
    }

    /// Register the built-in tools the config enables, all consuming the
    /// given executor capability.
    pub fn register_builtin_tools(
        &self,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<(), RegistryError> {
        let flags = &self.config.tools;
        let format = self.config.default_format;
        if flags.enable_query {
            self.register_tool(Arc::new(QueryTool::new(Arc::clone(&executor), format)))?;
        }
        if flags.enable_describe {
            self.register_tool(Arc::new(DescribeTool::new(Arc::clone(&executor))))?;
        }
        if flags.enable_list_tables {
            self.register_tool(Arc::new(ListTablesTool::new(Arc::clone(&executor))))?;
        }
        if flags.enable_database_info {
            self.register_tool(Arc::new(DatabaseInfoTool::new(Arc::clone(&executor))))?;
        }
        if flags.enable_export {
            self.register_tool(Arc::new(ExportTool::new(Arc::clone(&executor), format)))?;
        }
        if flags.enable_execute {
            let mut kinds = Vec::new();
            for name in &flags.execute_allowed_kinds {
                match StatementKind::parse(name) {
                    Some(kind) => kinds.push(kind),
                    None => {
                        tracing::warn!(kind = %name, "unknown statement kind in execute allow-list, ignoring")
                    }
                }
            }
            self.register_tool(Arc::new(ExecuteTool::new(executor, kinds)))?;
        }
        Ok(())
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Start serving on the configured transport. Subprocess/HTTP get a
    /// dedicated execution loop; the in-process transport is reactive and
    /// driven through [`McpServer::handle_text`].
    pub async fn start(self: &Arc<Self>) -> Result<(), ServerError> {
        if self.security.serving_disabled() {
            return Err(ServerError::ServingDisabled);
        }
        {
            let mut lifecycle = self.lock_lifecycle();
            if *lifecycle != Lifecycle::Stopped {
                return Err(ServerError::AlreadyRunning);
            }
            *lifecycle = Lifecycle::Starting;
        }
        self.shutdown_tx.send_replace(false);

        if let Some(queue) = &self.pending {
            self.flush_pending(queue);
        }

        let start_result = match self.config.transport.clone() {
            TransportConfig::Subprocess(_) => {
                // Serving side of a subprocess attachment: our own stdio.
                let transport: Arc<dyn Transport> = Arc::new(StdioTransport::new());
                let server = Arc::clone(self);
                let handle = tokio::spawn(async move { server.serve_transport(transport).await });
                self.tasks.lock().await.push(handle);
                Ok(())
            }
            TransportConfig::Http(http_config) => {
                let mut transport = HttpServerTransport::new(http_config);
                let handler = self.request_handler();
                match transport.start(handler).await {
                    Ok(_) => {
                        *self.http.lock().await = Some(transport);
                        // Dispatch-triggered shutdown must also stop the
                        // listener.
                        let server = Arc::clone(self);
                        let mut shutdown_rx = self.shutdown_tx.subscribe();
                        let handle = tokio::spawn(async move {
                            loop {
                                if shutdown_rx.changed().await.is_err() {
                                    return;
                                }
                                if *shutdown_rx.borrow() {
                                    break;
                                }
                            }
                            if let Some(mut http) = server.http.lock().await.take() {
                                http.stop().await;
                            }
                            server.mark_stopped();
                        });
                        self.tasks.lock().await.push(handle);
                        Ok(())
                    }
                    Err(e) => Err(ServerError::Transport(e)),
                }
            }
            TransportConfig::InProcess => Ok(()),
        };

        match start_result {
            Ok(()) => {
                *self.lock_started_at() = Some(Instant::now());
                *self.lock_lifecycle() = Lifecycle::Running;
                tracing::info!(
                    server = %self.server_name,
                    transport = %self.config.transport.kind(),
                    "MCP server started"
                );
                Ok(())
            }
            Err(e) => {
                *self.lock_lifecycle() = Lifecycle::Stopped;
                Err(e)
            }
        }
    }

    /// Signal the execution loops to exit and join them. In-flight
    /// requests get the configured timeout to finish.
    pub async fn stop(&self) {
        {
            let mut lifecycle = self.lock_lifecycle();
            if *lifecycle == Lifecycle::Stopped {
                return;
            }
            *lifecycle = Lifecycle::Stopping;
        }
        self.shutdown_tx.send_replace(true);

        if let Some(mut http) = self.http.lock().await.take() {
            http.stop().await;
        }

        let timeout = self.config.limits.request_timeout();
        let mut tasks = self.tasks.lock().await;
        for handle in tasks.drain(..) {
            if tokio::time::timeout(timeout, handle).await.is_err() {
                tracing::warn!("serving task did not finish within the stop timeout");
            }
        }
        self.mark_stopped();
        tracing::info!(server = %self.server_name, "MCP server stopped");
    }

    fn mark_stopped(&self) {
        *self.lock_lifecycle() = Lifecycle::Stopped;
        *self.lock_started_at() = None;
    }

    fn flush_pending(&self, queue: &RegistrationQueue) {
        for registration in queue.drain() {
            let result = match registration {
                PendingRegistration::Tool(handler) => self.register_tool(handler),
                PendingRegistration::Resource(entry) => self.publish_resource(entry),
                PendingRegistration::Prompt(template) => self.register_prompt(template),
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, "skipping pending registration");
            }
        }
    }

    /// Point-in-time status snapshot.
    pub fn status(&self) -> ServerStatus {
        let started_at = *self.lock_started_at();
        let uptime_seconds = started_at.map_or(0, |at| at.elapsed().as_secs());
        ServerStatus {
            state: self.lifecycle().as_str().to_string(),
            transport: self.config.transport.kind().to_string(),
            uptime_seconds,
            requests_received: self.stats.requests_received(),
            responses_sent: self.stats.responses_sent(),
            errors_returned: self.stats.errors_returned(),
            tools: self.tools.len(),
            resources: self.resources.len(),
            prompts: self.prompts.len(),
        }
    }

    /// Bound address of the HTTP listener, when serving HTTP.
    pub async fn http_addr(&self) -> Option<std::net::SocketAddr> {
        self.http.lock().await.as_ref().and_then(|t| t.local_addr())
    }

    // ── Serving ─────────────────────────────────────────────────────

    /// Receive/dispatch loop over one transport, until the transport
    /// closes or shutdown is signalled.
    pub async fn serve_transport(self: Arc<Self>, transport: Arc<dyn Transport>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            let received = tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }
                received = transport.receive() => received,
            };

            match received {
                Ok(Message::Request(request)) => {
                    let is_shutdown = request.method == methods::SHUTDOWN;
                    let response = self.handle_request(&request).await;
                    match transport.send(&Message::Response(response)).await {
                        Ok(()) => self.stats.record_response(),
                        Err(e) => tracing::warn!(error = %e, "failed to send response"),
                    }
                    if is_shutdown {
                        break;
                    }
                }
                Ok(Message::Notification(notification)) => {
                    self.handle_notification(&notification);
                }
                Ok(Message::Response(_)) => {
                    tracing::debug!("ignoring unsolicited response on server transport");
                }
                Err(TransportError::Closed) => {
                    tracing::info!("transport closed, exiting serve loop");
                    break;
                }
                Err(TransportError::Protocol(e)) => {
                    // Malformed input never crosses back unanswered: emit a
                    // well-formed PARSE_ERROR response.
                    self.stats.record_error();
                    let response = err_response(RpcId::Null, &e);
                    if transport.send(&Message::Response(response)).await.is_ok() {
                        self.stats.record_response();
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "transport error, exiting serve loop");
                    break;
                }
            }
        }
    }

    /// Full inbound path for text-carrying transports (HTTP body,
    /// in-process driving): parse, classify, dispatch, serialize.
    /// Notifications — and anything that must not be answered — yield
    /// `None`.
    pub async fn handle_text(&self, text: &str) -> Option<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        match Message::parse(trimmed) {
            Ok(Message::Request(request)) => {
                let response = self.handle_request(&request).await;
                self.serialize_response(response)
            }
            Ok(Message::Notification(notification)) => {
                self.handle_notification(&notification);
                None
            }
            Ok(Message::Response(_)) => {
                tracing::debug!("ignoring unsolicited response");
                None
            }
            Err(e) => {
                // A parse failure must answer rather than throw past the
                // transport boundary.
                self.stats.record_error();
                self.serialize_response(err_response(RpcId::Null, &e))
            }
        }
    }

    fn serialize_response(&self, response: Response) -> Option<String> {
        match Message::Response(response).to_json() {
            Ok(json) => {
                self.stats.record_response();
                Some(json)
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize response");
                Some(
                    r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"internal serialization failure"}}"#
                        .to_string(),
                )
            }
        }
    }

    fn request_handler(self: &Arc<Self>) -> RequestHandler {
        let server = Arc::clone(self);
        Arc::new(move |body: String| {
            let server = Arc::clone(&server);
            Box::pin(async move { server.handle_text(&body).await })
        })
    }

    // ── Dispatch ────────────────────────────────────────────────────

    /// Handle a single request and produce its response.
    pub async fn handle_request(&self, request: &Request) -> Response {
        self.stats.record_request();
        let id = request.id.clone();
        let outcome = match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(),
            methods::RESOURCES_LIST => self.handle_resources_list(&request.params),
            methods::RESOURCES_READ => self.handle_resources_read(&request.params).await,
            methods::TOOLS_LIST => self.handle_tools_list(&request.params),
            methods::TOOLS_CALL => self.handle_tools_call(&request.params).await,
            methods::PROMPTS_LIST => self.handle_prompts_list(&request.params),
            methods::PROMPTS_GET => self.handle_prompts_get(&request.params),
            methods::PING => Ok(serde_json::json!({})),
            methods::SHUTDOWN => self.handle_shutdown(),
            method => {
                tracing::warn!(method = %method, "unknown method");
                Err(ProtocolError::MethodNotFound(method.to_string()))
            }
        };
        match outcome {
            Ok(result) => ok_response(id, result),
            Err(e) => {
                self.stats.record_error();
                err_response(id, &e)
            }
        }
    }

    /// Notifications are accepted and ignored, known or not; they never
    /// produce a response even on error.
    pub fn handle_notification(&self, notification: &Notification) {
        match notification.method.as_str() {
            methods::NOTIFICATION_INITIALIZED => {
                tracing::info!("client confirmed initialization");
            }
            methods::NOTIFICATION_CANCELLED => {
                tracing::debug!("client cancelled a request");
            }
            methods::NOTIFICATION_PROGRESS => {
                tracing::trace!("client progress notification");
            }
            method => {
                tracing::debug!(method = %method, "unknown notification, ignoring");
            }
        }
    }

    fn handle_initialize(&self) -> Result<Value, ProtocolError> {
        self.initialized.store(true, Ordering::SeqCst);
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                resources: Some(ResourcesCapability::default()),
                tools: Some(ToolsCapability::default()),
                prompts: Some(PromptsCapability::default()),
            },
            server_info: ServerInfo {
                name: self.server_name.clone(),
                version: Some(self.server_version.clone()),
            },
        };
        serde_json::to_value(result).map_err(|e| ProtocolError::Internal(e.to_string()))
    }

    fn cursor_of(params: &Option<Value>) -> Option<String> {
        params
            .as_ref()
            .and_then(|p| p.get("cursor"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn handle_tools_list(&self, params: &Option<Value>) -> Result<Value, ProtocolError> {
        let infos: Vec<ToolInfo> = self
            .tools
            .snapshot()
            .into_iter()
            .map(|(_, handler)| handler.definition())
            .collect();
        let page = paginate(
            &infos,
            Self::cursor_of(params).as_deref(),
            self.config.limits.max_page_size,
        )?;
        let result = ListToolsResult {
            tools: page.items,
            next_cursor: page.next_cursor,
        };
        serde_json::to_value(result).map_err(|e| ProtocolError::Internal(e.to_string()))
    }

    fn handle_resources_list(&self, params: &Option<Value>) -> Result<Value, ProtocolError> {
        let infos: Vec<_> = self
            .resources
            .snapshot()
            .into_iter()
            .map(|(_, entry)| entry.info())
            .collect();
        let page = paginate(
            &infos,
            Self::cursor_of(params).as_deref(),
            self.config.limits.max_page_size,
        )?;
        let result = ListResourcesResult {
            resources: page.items,
            next_cursor: page.next_cursor,
        };
        serde_json::to_value(result).map_err(|e| ProtocolError::Internal(e.to_string()))
    }

    fn handle_prompts_list(&self, params: &Option<Value>) -> Result<Value, ProtocolError> {
        let infos: Vec<_> = self
            .prompts
            .snapshot()
            .into_iter()
            .map(|(_, template)| template.info())
            .collect();
        let page = paginate(
            &infos,
            Self::cursor_of(params).as_deref(),
            self.config.limits.max_page_size,
        )?;
        let result = ListPromptsResult {
            prompts: page.items,
            next_cursor: page.next_cursor,
        };
        serde_json::to_value(result).map_err(|e| ProtocolError::Internal(e.to_string()))
    }

    async fn handle_resources_read(&self, params: &Option<Value>) -> Result<Value, ProtocolError> {
        let uri = params
            .as_ref()
            .and_then(|p| p.get("uri"))
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::InvalidParams("missing uri parameter".to_string()))?;

        let entry = self
            .resources
            .get(uri)
            .ok_or_else(|| ProtocolError::ResourceNotFound(uri.to_string()))?;

        // Provider runs with the registry lock long gone; a concurrent
        // unpublish cannot invalidate `entry`.
        let content = entry
            .provider
            .read()
            .await
            .map_err(|e| ProtocolError::Internal(sanitize_detail(&e.to_string())))?;

        let result = ReadResourceResult {
            contents: vec![ResourceContents {
                uri: uri.to_string(),
                mime_type: Some(entry.provider.mime_type()),
                text: content,
            }],
        };
        serde_json::to_value(result).map_err(|e| ProtocolError::Internal(e.to_string()))
    }

    async fn handle_tools_call(&self, params: &Option<Value>) -> Result<Value, ProtocolError> {
        let params = params
            .as_ref()
            .ok_or_else(|| ProtocolError::InvalidParams("missing params".to_string()))?;
        let call: CallToolParams = serde_json::from_value(params.clone())
            .map_err(|e| ProtocolError::InvalidParams(e.to_string()))?;

        let handler = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ProtocolError::ToolNotFound(call.name.clone()))?;

        tracing::debug!(tool = %call.name, "dispatching tools/call");

        // Handler failures are contained here: a panic or error becomes a
        // JSON-RPC error instead of crossing the transport boundary.
        let execution = AssertUnwindSafe(handler.execute(call.arguments))
            .catch_unwind()
            .await;
        let result = match execution {
            Err(_) => {
                tracing::error!(tool = %call.name, "tool handler panicked");
                return Err(ProtocolError::Internal(format!(
                    "tool '{}' failed unexpectedly",
                    call.name
                )));
            }
            Ok(Err(ToolError::InvalidInput(detail))) => {
                return Err(ProtocolError::InvalidToolInput(sanitize_detail(&detail)))
            }
            Ok(Err(ToolError::AccessDenied(detail))) => {
                return Err(ProtocolError::AccessDenied(sanitize_detail(&detail)))
            }
            Ok(Err(ToolError::ExecutionFailed(detail))) => {
                gangway_protocol::CallToolResult::error(sanitize_detail(&detail))
            }
            Ok(Ok(result)) => result,
        };
        serde_json::to_value(result).map_err(|e| ProtocolError::Internal(e.to_string()))
    }

    fn handle_prompts_get(&self, params: &Option<Value>) -> Result<Value, ProtocolError> {
        let params = params
            .as_ref()
            .ok_or_else(|| ProtocolError::InvalidParams("missing params".to_string()))?;
        let get: GetPromptParams = serde_json::from_value(params.clone())
            .map_err(|e| ProtocolError::InvalidParams(e.to_string()))?;

        let template = self
            .prompts
            .get(&get.name)
            .ok_or_else(|| ProtocolError::InvalidParams(format!("unknown prompt: {}", get.name)))?;

        let result = template
            .get(&get.arguments)
            .map_err(|e| ProtocolError::InvalidParams(e.to_string()))?;
        serde_json::to_value(result).map_err(|e| ProtocolError::Internal(e.to_string()))
    }

    fn handle_shutdown(&self) -> Result<Value, ProtocolError> {
        tracing::info!(server = %self.server_name, "shutdown requested");
        self.shutdown_tx.send_replace(true);
        Ok(serde_json::json!({
            "status": "shutting down",
            "message": "Server shutdown initiated"
        }))
    }

    fn lock_lifecycle(&self) -> std::sync::MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_started_at(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.started_at.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn ok_response(id: RpcId, result: Value) -> Response {
    Response {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id,
        result: Some(result),
        error: None,
    }
}

fn err_response(id: RpcId, error: &ProtocolError) -> Response {
    Response {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id,
        result: None,
        error: Some(error.to_rpc_error()),
    }
}
