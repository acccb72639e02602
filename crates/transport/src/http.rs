//! HTTP client transport: one POST exchange per JSON-RPC call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use gangway_core::HttpConfig;
use gangway_protocol::Message;

use crate::{Transport, TransportError};

/// Client side of JSON-RPC over HTTP.
///
/// Each call is an independent POST with the configured timeout. Transport
/// failures (refused connection, timeout) retry up to `config.retries`
/// times with exponential backoff; HTTP status errors and protocol errors
/// never retry.
pub struct HttpClientTransport {
    config: HttpConfig,
    url: String,
    client: Option<reqwest::Client>,
    connected: AtomicBool,
}

impl HttpClientTransport {
    pub fn new(config: HttpConfig) -> Self {
        let url = config.base_url();
        Self {
            config,
            url,
            client: None,
            connected: AtomicBool::new(false),
        }
    }

    fn client(&self) -> Result<&reqwest::Client, TransportError> {
        self.client.as_ref().ok_or(TransportError::NotConnected)
    }

    async fn exchange(&self, body: &str) -> Result<String, TransportError> {
        let client = self.client()?;
        let mut request = client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string());
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus(status.as_u16()));
        }
        response
            .text()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))
    }
}

#[async_trait]
impl Transport for HttpClientTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.client.is_some() {
            return Ok(());
        }
        let client = reqwest::Client::builder()
            .timeout(self.config.timeout())
            .build()
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        // Probe the liveness endpoint so a dead endpoint is a connect
        // failure, not a surprise on the first call.
        let health_url = format!("{}/health", self.url);
        let probe = client.get(&health_url).send().await;
        match probe {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                return Err(TransportError::ConnectFailed(format!(
                    "health probe returned {}",
                    resp.status()
                )))
            }
            Err(e) => return Err(TransportError::ConnectFailed(e.to_string())),
        }

        self.client = Some(client);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.client = None;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Fire-and-forget POST, used for notifications. The (empty) reply
    /// body is discarded.
    async fn send(&self, message: &Message) -> Result<(), TransportError> {
        let body = message.to_json()?;
        self.exchange(&body).await?;
        Ok(())
    }

    async fn receive(&self) -> Result<Message, TransportError> {
        Err(TransportError::Unsupported(
            "HTTP transport is exchange-oriented; use send_and_receive",
        ))
    }

    async fn send_and_receive(&self, message: &Message) -> Result<Message, TransportError> {
        let body = message.to_json()?;
        let mut attempt = 0u32;
        loop {
            match self.exchange(&body).await {
                Ok(reply) => return Ok(Message::parse(&reply)?),
                Err(e) if e.is_retryable() && attempt < self.config.retries => {
                    let backoff = Duration::from_millis(100 << attempt.min(6));
                    tracing::warn!(error = %e, attempt, "HTTP exchange failed, retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn connection_info(&self) -> String {
        self.url.clone()
    }
}
