//! Server-side stdio transport.
//!
//! The child end of a subprocess attachment: reads requests from this
//! process's stdin and writes responses to stdout, one JSON message per
//! line. Used by a server launched with `--stdio`-style wiring.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use gangway_protocol::Message;

use crate::{Transport, TransportError};

pub struct StdioTransport {
    reader: Mutex<BufReader<tokio::io::Stdin>>,
    writer: Mutex<tokio::io::Stdout>,
    connected: AtomicBool,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            reader: Mutex::new(BufReader::new(tokio::io::stdin())),
            writer: Mutex::new(tokio::io::stdout()),
            connected: AtomicBool::new(true),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, message: &Message) -> Result<(), TransportError> {
        let json = message.to_json()?;
        let mut writer = self.writer.lock().await;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    /// Blocks until a line arrives. EOF on stdin means the parent hung up.
    async fn receive(&self) -> Result<Message, TransportError> {
        let mut reader = self.reader.lock().await;
        loop {
            let mut line = String::new();
            let bytes_read = reader.read_line(&mut line).await?;
            if bytes_read == 0 {
                self.connected.store(false, Ordering::SeqCst);
                return Err(TransportError::Closed);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Ok(Message::parse(trimmed)?);
        }
    }

    async fn send_and_receive(&self, message: &Message) -> Result<Message, TransportError> {
        self.send(message).await?;
        self.receive().await
    }

    async fn ping(&self) -> bool {
        self.is_connected()
    }

    fn connection_info(&self) -> String {
        "stdio (own stdin/stdout)".to_string()
    }
}
