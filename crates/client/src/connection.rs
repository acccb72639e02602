//! Client connection state machine.
//!
//! A [`Connection`] owns one transport and drives it through the
//! initialize handshake, then exposes the server's tools, resources and
//! prompts. The transition lock (`state`) is distinct from the lock
//! guarding the last error, so a failure discovered while transitioning
//! can be recorded without self-deadlock.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use gangway_core::{HttpConfig, SecurityPolicy, SubprocessConfig};
use gangway_protocol::pagination::{parse_page, MAX_PAGE_WALK};
use gangway_protocol::types::methods;
use gangway_protocol::{
    CallToolResult, ClientCapabilities, ClientInfo, GetPromptResult, InitializeParams,
    InitializeResult, Message, PageResult, ReadResourceResult, Response, RpcId, PROTOCOL_VERSION,
};
use gangway_transport::{HttpClientTransport, SubprocessTransport, Transport};

use crate::error::ConnectionError;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Initialized,
    Failed,
}

/// What the server actually declared during initialization, flattened to
/// per-family booleans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NegotiatedCapabilities {
    pub resources: bool,
    pub tools: bool,
    pub prompts: bool,
}

/// Bounded retry for transport-level failures. Protocol-level error
/// responses are never retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_backoff: Duration::from_millis(100),
        }
    }
}

/// A client connection to one MCP server.
pub struct Connection {
    name: String,
    transport: AsyncMutex<Box<dyn Transport>>,
    state: Mutex<ConnectionState>,
    last_error: Mutex<Option<String>>,
    capabilities: Mutex<NegotiatedCapabilities>,
    next_id: AtomicI64,
    retry: RetryPolicy,
}

impl Connection {
    pub fn new(name: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        Self {
            name: name.into(),
            transport: AsyncMutex::new(transport),
            state: Mutex::new(ConnectionState::Disconnected),
            last_error: Mutex::new(None),
            capabilities: Mutex::new(NegotiatedCapabilities::default()),
            next_id: AtomicI64::new(1),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Attach to a server launched as a subprocess, consulting the
    /// security policy before anything is spawned.
    pub fn attach_subprocess(
        name: impl Into<String>,
        config: SubprocessConfig,
        policy: &SecurityPolicy,
    ) -> Result<Self, ConnectionError> {
        policy.validate_attach(&config.command, &config.args)?;
        Ok(Self::new(name, Box::new(SubprocessTransport::new(config))))
    }

    /// Attach to a server behind an HTTP endpoint, consulting the security
    /// policy before any request leaves the process.
    pub fn attach_http(
        name: impl Into<String>,
        config: HttpConfig,
        policy: &SecurityPolicy,
    ) -> Result<Self, ConnectionError> {
        policy.validate_url(&config.base_url())?;
        Ok(Self::new(name, Box::new(HttpClientTransport::new(config))))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConnectionState {
        *self.lock_state()
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == ConnectionState::Initialized
    }

    /// Capabilities the server actually declared, not a hardcoded default.
    pub fn capabilities(&self) -> NegotiatedCapabilities {
        *self.capabilities.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn set_error(&self, error: impl Into<String>) {
        let error = error.into();
        tracing::warn!(connection = %self.name, error = %error, "connection error");
        *self.last_error.lock().unwrap_or_else(|p| p.into_inner()) = Some(error);
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Establish the transport and perform the initialize handshake.
    pub async fn initialize(&self) -> Result<(), ConnectionError> {
        if self.is_initialized() {
            return Ok(());
        }
        *self.lock_state() = ConnectionState::Connecting;

        let connect_result = {
            let mut transport = self.transport.lock().await;
            transport.connect().await
        };
        if let Err(e) = connect_result {
            self.set_error(e.to_string());
            *self.lock_state() = ConnectionState::Failed;
            return Err(e.into());
        }

        match self.handshake().await {
            Ok(()) => {
                *self.lock_state() = ConnectionState::Initialized;
                tracing::info!(connection = %self.name, "MCP connection initialized");
                Ok(())
            }
            Err(e) => {
                self.set_error(e.to_string());
                *self.lock_state() = ConnectionState::Failed;
                Err(e)
            }
        }
    }

    async fn handshake(&self) -> Result<(), ConnectionError> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: ClientInfo {
                name: "gangway-client".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            },
        };
        let response = self
            .request(methods::INITIALIZE, Some(serde_json::to_value(&params).map_err(
                |e| ConnectionError::Protocol(e.to_string()),
            )?))
            .await?;
        let result: InitializeResult = serde_json::from_value(self.unwrap_result(response)?)
            .map_err(|e| ConnectionError::Protocol(format!("malformed initialize result: {e}")))?;

        // Store what the server declared, family by family.
        let negotiated = NegotiatedCapabilities {
            resources: result.capabilities.resources.is_some(),
            tools: result.capabilities.tools.is_some(),
            prompts: result.capabilities.prompts.is_some(),
        };
        *self.capabilities.lock().unwrap_or_else(|p| p.into_inner()) = negotiated;
        tracing::debug!(
            connection = %self.name,
            server = %result.server_info.name,
            ?negotiated,
            "handshake complete"
        );

        self.notify(methods::NOTIFICATION_INITIALIZED, None).await?;
        Ok(())
    }

    /// Tear down the transport and return to `Disconnected`.
    pub async fn disconnect(&self) -> Result<(), ConnectionError> {
        {
            let mut transport = self.transport.lock().await;
            transport.disconnect().await?;
        }
        *self.lock_state() = ConnectionState::Disconnected;
        Ok(())
    }

    pub async fn ping(&self) -> bool {
        let transport = self.transport.lock().await;
        transport.ping().await
    }

    // ── Listing operations ──────────────────────────────────────────

    pub async fn list_resources(
        &self,
        cursor: Option<&str>,
    ) -> Result<PageResult<Value>, ConnectionError> {
        self.list_page(methods::RESOURCES_LIST, "resources", cursor).await
    }

    pub async fn list_tools(
        &self,
        cursor: Option<&str>,
    ) -> Result<PageResult<Value>, ConnectionError> {
        self.list_page(methods::TOOLS_LIST, "tools", cursor).await
    }

    pub async fn list_prompts(
        &self,
        cursor: Option<&str>,
    ) -> Result<PageResult<Value>, ConnectionError> {
        self.list_page(methods::PROMPTS_LIST, "prompts", cursor).await
    }

    /// Walk cursors from the beginning until the server stops returning
    /// one, bounded so a misbehaving server cannot loop us forever.
    pub async fn fetch_all_tools(&self) -> Result<Vec<Value>, ConnectionError> {
        self.fetch_all(methods::TOOLS_LIST, "tools").await
    }

    pub async fn fetch_all_resources(&self) -> Result<Vec<Value>, ConnectionError> {
        self.fetch_all(methods::RESOURCES_LIST, "resources").await
    }

    pub async fn fetch_all_prompts(&self) -> Result<Vec<Value>, ConnectionError> {
        self.fetch_all(methods::PROMPTS_LIST, "prompts").await
    }

    async fn fetch_all(
        &self,
        method: &str,
        items_field: &str,
    ) -> Result<Vec<Value>, ConnectionError> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_PAGE_WALK {
            let page = self.list_page(method, items_field, cursor.as_deref()).await?;
            items.extend(page.items);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(items),
            }
        }
        Err(ConnectionError::Protocol(format!(
            "{method} exceeded {MAX_PAGE_WALK} pages without completing"
        )))
    }

    async fn list_page(
        &self,
        method: &str,
        items_field: &str,
        cursor: Option<&str>,
    ) -> Result<PageResult<Value>, ConnectionError> {
        self.ensure_initialized()?;
        let params = cursor.map(|c| serde_json::json!({ "cursor": c }));
        let response = self.request(method, params).await?;
        let result = self.unwrap_result(response)?;
        Ok(parse_page(&result, items_field)?)
    }

    // ── Invocation operations ───────────────────────────────────────

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolResult, ConnectionError> {
        self.ensure_initialized()?;
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        let response = self.request(methods::TOOLS_CALL, Some(params)).await?;
        let result = self.unwrap_result(response)?;
        serde_json::from_value(result)
            .map_err(|e| ConnectionError::Protocol(format!("malformed tool result: {e}")))
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, ConnectionError> {
        self.ensure_initialized()?;
        let params = serde_json::json!({ "uri": uri });
        let response = self.request(methods::RESOURCES_READ, Some(params)).await?;
        let result = self.unwrap_result(response)?;
        serde_json::from_value(result)
            .map_err(|e| ConnectionError::Protocol(format!("malformed resource result: {e}")))
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: BTreeMap<String, String>,
    ) -> Result<GetPromptResult, ConnectionError> {
        self.ensure_initialized()?;
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        let response = self.request(methods::PROMPTS_GET, Some(params)).await?;
        let result = self.unwrap_result(response)?;
        serde_json::from_value(result)
            .map_err(|e| ConnectionError::Protocol(format!("malformed prompt result: {e}")))
    }

    // ── Plumbing ────────────────────────────────────────────────────

    fn ensure_initialized(&self) -> Result<(), ConnectionError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(ConnectionError::NotInitialized)
        }
    }

    fn unwrap_result(&self, response: Response) -> Result<Value, ConnectionError> {
        response.into_result().map_err(ConnectionError::from)
    }

    /// One request/response exchange with bounded retry on transport
    /// failures. A protocol-level error response returns immediately.
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Response, ConnectionError> {
        let id = RpcId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let message = Message::request(id, method, params);

        let mut attempt = 0u32;
        loop {
            let result = {
                let transport = self.transport.lock().await;
                transport.send_and_receive(&message).await
            };
            match result {
                Ok(Message::Response(response)) => return Ok(response),
                Ok(other) => {
                    return Err(ConnectionError::Protocol(format!(
                        "expected a response to {method}, got {:?}",
                        other.method()
                    )))
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let backoff = self.retry.base_backoff * 2u32.saturating_pow(attempt);
                    tracing::warn!(
                        connection = %self.name,
                        method = %method,
                        attempt,
                        error = %e,
                        "transport failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    self.set_error(e.to_string());
                    return Err(e.into());
                }
            }
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ConnectionError> {
        let message = Message::notification(method, params);
        let transport = self.transport.lock().await;
        transport.send(&message).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gangway_protocol::{error_codes, Notification, Request, RpcError};
    use gangway_transport::ChannelTransport;

    /// Script a fake server on the peer half of a channel pair: for each
    /// incoming request, answer with the next canned reply (notifications
    /// are consumed silently).
    fn scripted_server(
        peer: ChannelTransport,
        replies: Vec<Value>,
    ) -> tokio::task::JoinHandle<Vec<Message>> {
        tokio::spawn(async move {
            let mut seen = Vec::new();
            let mut replies = replies.into_iter();
            loop {
                let message = match peer.receive().await {
                    Ok(m) => m,
                    Err(_) => break,
                };
                seen.push(message.clone());
                if let Message::Request(req) = &message {
                    let Some(result) = replies.next() else { break };
                    let reply = if result.get("__error").is_some() {
                        Message::error_response(
                            req.id.clone(),
                            RpcError {
                                code: result["__error"]["code"].as_i64().unwrap(),
                                message: result["__error"]["message"]
                                    .as_str()
                                    .unwrap()
                                    .to_string(),
                                data: None,
                            },
                        )
                    } else {
                        Message::response(req.id.clone(), result)
                    };
                    if peer.send(&reply).await.is_err() {
                        break;
                    }
                }
            }
            seen
        })
    }

    fn initialize_reply(with_prompts: bool) -> Value {
        let mut capabilities = serde_json::json!({
            "resources": {"listChanged": false, "subscribe": false},
            "tools": {"listChanged": false},
        });
        if with_prompts {
            capabilities["prompts"] = serde_json::json!({"listChanged": false});
        }
        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": capabilities,
            "serverInfo": {"name": "scripted", "version": "0.0.1"}
        })
    }

    #[tokio::test]
    async fn test_initialize_stores_declared_capabilities() {
        let (ours, theirs) = ChannelTransport::pair();
        let server = scripted_server(theirs, vec![initialize_reply(false)]);

        let connection = Connection::new("scripted", Box::new(ours));
        connection.initialize().await.unwrap();

        assert_eq!(connection.state(), ConnectionState::Initialized);
        let caps = connection.capabilities();
        assert!(caps.resources);
        assert!(caps.tools);
        assert!(!caps.prompts, "prompts were not declared");

        // Dropping the connection closes the channel and ends the script.
        drop(connection);
        let seen = server.await.unwrap();
        // initialize request followed by the initialized notification
        assert!(matches!(&seen[0], Message::Request(Request { method, .. }) if method == "initialize"));
        assert!(matches!(
            &seen[1],
            Message::Notification(Notification { method, .. })
                if method == "notifications/initialized"
        ));
    }

    #[tokio::test]
    async fn test_list_tools_walks_cursor() {
        let (ours, theirs) = ChannelTransport::pair();
        let _server = scripted_server(
            theirs,
            vec![
                initialize_reply(true),
                serde_json::json!({"tools": [{"name": "a"}, {"name": "b"}], "nextCursor": "c1"}),
                serde_json::json!({"tools": [{"name": "c"}]}),
            ],
        );

        let connection = Connection::new("scripted", Box::new(ours));
        connection.initialize().await.unwrap();

        let all = connection.fetch_all_tools().await.unwrap();
        let names: Vec<&str> = all.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_tool_not_found_maps_to_typed_error() {
        let (ours, theirs) = ChannelTransport::pair();
        let server = scripted_server(
            theirs,
            vec![
                initialize_reply(true),
                serde_json::json!({"__error": {
                    "code": error_codes::TOOL_NOT_FOUND,
                    "message": "tool not found: missing"
                }}),
            ],
        );

        let connection = Connection::new("scripted", Box::new(ours));
        connection.initialize().await.unwrap();

        let err = connection
            .call_tool("missing", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::ToolNotFound(_)));

        // A protocol-level error is never retried: exactly one initialize
        // request, one notification, one tools/call.
        drop(connection);
        let seen = server.await.unwrap();
        let call_count = seen
            .iter()
            .filter(|m| m.method() == Some("tools/call"))
            .count();
        assert_eq!(call_count, 1);
    }

    #[tokio::test]
    async fn test_operations_require_initialize() {
        let (ours, _theirs) = ChannelTransport::pair();
        let connection = Connection::new("scripted", Box::new(ours));
        assert!(matches!(
            connection.list_tools(None).await.unwrap_err(),
            ConnectionError::NotInitialized
        ));
    }

    #[tokio::test]
    async fn test_transport_failure_records_last_error() {
        let (ours, theirs) = ChannelTransport::pair();
        drop(theirs); // peer gone: every exchange fails
        let connection = Connection::new("scripted", Box::new(ours)).with_retry(RetryPolicy {
            max_retries: 1,
            base_backoff: Duration::from_millis(1),
        });

        let err = connection.initialize().await.unwrap_err();
        assert!(matches!(err, ConnectionError::Transport(_)));
        assert_eq!(connection.state(), ConnectionState::Failed);
        assert!(connection.last_error().is_some());
    }

    #[tokio::test]
    async fn test_attach_subprocess_consults_policy() {
        let policy = SecurityPolicy::new();
        policy
            .set_allowed_commands(vec!["approved-server".to_string()])
            .unwrap();

        let denied = Connection::attach_subprocess(
            "bad",
            SubprocessConfig::new("unapproved-server"),
            &policy,
        );
        assert!(matches!(denied, Err(ConnectionError::Security(_))));

        let allowed = Connection::attach_subprocess(
            "good",
            SubprocessConfig::new("approved-server"),
            &policy,
        );
        assert!(allowed.is_ok());
    }

    #[tokio::test]
    async fn test_attach_http_consults_policy() {
        let policy = SecurityPolicy::new();
        policy
            .set_allowed_urls(vec!["http://allowed.example".to_string()])
            .unwrap();

        let mut config = HttpConfig::default();
        config.host = "denied.example".to_string();
        config.port = 80;
        assert!(matches!(
            Connection::attach_http("bad", config, &policy),
            Err(ConnectionError::Security(_))
        ));
    }

    #[tokio::test]
    async fn test_read_resource() {
        let (ours, theirs) = ChannelTransport::pair();
        let _server = scripted_server(
            theirs,
            vec![
                initialize_reply(true),
                serde_json::json!({"contents": [
                    {"uri": "demo://x", "mimeType": "text/plain", "text": "hello"}
                ]}),
            ],
        );

        let connection = Connection::new("scripted", Box::new(ours));
        connection.initialize().await.unwrap();

        let result = connection.read_resource("demo://x").await.unwrap();
        assert_eq!(result.contents.len(), 1);
        assert_eq!(result.contents[0].text, "hello");
        assert_eq!(result.contents[0].mime_type.as_deref(), Some("text/plain"));
    }
}
