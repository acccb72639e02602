//! HTTP server transport: axum listener exposing the JSON-RPC POST
//! endpoint and a GET liveness endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::future::BoxFuture;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};

use gangway_core::HttpConfig;

use crate::TransportError;

/// Dispatch callback: raw request body in, raw response body out.
/// `None` means the body was a notification and gets no reply payload.
pub type RequestHandler = Arc<dyn Fn(String) -> BoxFuture<'static, Option<String>> + Send + Sync>;

const UNAUTHORIZED_BODY: &str =
    r#"{"jsonrpc":"2.0","error":{"code":-32001,"message":"Unauthorized: authentication required"},"id":null}"#;
const FORBIDDEN_BODY: &str =
    r#"{"jsonrpc":"2.0","error":{"code":-32003,"message":"Forbidden: invalid credentials"},"id":null}"#;

#[derive(Clone)]
struct HttpServerState {
    handler: RequestHandler,
    auth_token: Option<String>,
}

/// Server side of JSON-RPC over HTTP.
///
/// `start` binds the listener and serves on a background task; `stop`
/// signals graceful shutdown and joins it, letting in-flight requests
/// finish.
pub struct HttpServerTransport {
    config: HttpConfig,
    shutdown_tx: Option<watch::Sender<bool>>,
    join: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl HttpServerTransport {
    pub fn new(config: HttpConfig) -> Self {
        Self {
            config,
            shutdown_tx: None,
            join: None,
            local_addr: None,
        }
    }

    /// Bind and start serving. Returns the bound address (useful with
    /// port 0).
    pub async fn start(&mut self, handler: RequestHandler) -> Result<SocketAddr, TransportError> {
        if let Some(addr) = self.local_addr {
            return Ok(addr); // already running
        }
        if self.config.is_tls() {
            // No silent downgrade: a TLS config must not serve plain HTTP.
            return Err(TransportError::Config(
                "TLS cert/key configured but TLS serving is not supported".to_string(),
            ));
        }

        let app = router(&self.config, handler);
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|e| {
                TransportError::ConnectFailed(format!(
                    "bind {}:{}: {e}",
                    self.config.host, self.config.port
                ))
            })?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });
        let join = tokio::spawn(async move {
            if let Err(e) = server.await {
                tracing::error!(error = %e, "HTTP MCP server terminated abnormally");
            }
        });

        tracing::info!(addr = %addr, "HTTP MCP server listening");
        self.shutdown_tx = Some(shutdown_tx);
        self.join = Some(join);
        self.local_addr = Some(addr);
        Ok(addr)
    }

    /// Signal shutdown and wait for the serving task to exit.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
        self.local_addr = None;
    }

    pub fn is_running(&self) -> bool {
        self.local_addr.is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn connection_info(&self) -> String {
        match self.local_addr {
            Some(addr) => format!("http://{addr}"),
            None => format!("http://{}:{} (not started)", self.config.host, self.config.port),
        }
    }
}

/// Build the router. Exposed separately so tests can drive it without a
/// socket.
pub fn router(config: &HttpConfig, handler: RequestHandler) -> Router {
    let state = HttpServerState {
        handler,
        auth_token: config.auth_token.clone(),
    };

    let mut app = Router::new()
        .route("/", post(handle_rpc))
        .route("/mcp", post(handle_rpc))
        .route("/health", get(handle_health))
        .with_state(state);

    // CORS is opt-in: headers are emitted only for explicitly configured
    // origins. Wildcard CORS plus bearer auth is a foot-gun.
    if !config.cors_origins.is_empty() {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        app = app.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
                .max_age(Duration::from_secs(86_400)),
        );
    }

    app
}

async fn handle_rpc(
    State(state): State<HttpServerState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if let Some(token) = &state.auth_token {
        let Some(provided) = headers.get(header::AUTHORIZATION) else {
            return (
                StatusCode::UNAUTHORIZED,
                [
                    (header::WWW_AUTHENTICATE, "Bearer"),
                    (header::CONTENT_TYPE, "application/json"),
                ],
                UNAUTHORIZED_BODY,
            )
                .into_response();
        };
        let expected = format!("Bearer {token}");
        if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
            return (
                StatusCode::FORBIDDEN,
                [(header::CONTENT_TYPE, "application/json")],
                FORBIDDEN_BODY,
            )
                .into_response();
        }
    }

    match (state.handler)(body).await {
        Some(reply) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            reply,
        )
            .into_response(),
        // Notification: acknowledged with an empty body, never answered.
        None => StatusCode::OK.into_response(),
    }
}

/// Liveness endpoint; deliberately outside the auth gate.
async fn handle_health() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        r#"{"status":"ok"}"#,
    )
}

/// Compare two byte strings in time independent of where they differ.
/// Always scans the longer of the two lengths, never the request's length
/// alone, so attackers learn nothing from response timing.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let len = a.len().max(b.len());
    let mut diff = a.len() ^ b.len();
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= usize::from(x ^ y);
    }
    diff == 0
}
