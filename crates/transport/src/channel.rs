//! In-process transport for deterministic testing: two connected queue
//! halves, no process or socket involved.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

use gangway_protocol::Message;

use crate::{Transport, TransportError};

/// One half of a paired in-process transport.
///
/// Messages are carried as wire-format text so the codec is exercised
/// exactly as it is over a real channel. `receive` awaits on the queue
/// until a message arrives or the peer is dropped.
pub struct ChannelTransport {
    tx: mpsc::Sender<String>,
    rx: Mutex<mpsc::Receiver<String>>,
    connected: AtomicBool,
}

impl ChannelTransport {
    /// Create a pair of connected transports. Messages sent on one half
    /// are received by the other.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_b) = mpsc::channel(32);
        let (tx_b, rx_a) = mpsc::channel(32);
        (Self::half(tx_a, rx_a), Self::half(tx_b, rx_b))
    }

    fn half(tx: mpsc::Sender<String>, rx: mpsc::Receiver<String>) -> Self {
        Self {
            tx,
            rx: Mutex::new(rx),
            connected: AtomicBool::new(true),
        }
    }

    /// Push raw text to the peer, bypassing serialization. Lets tests
    /// exercise the peer's handling of malformed input.
    pub async fn send_raw(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.tx
            .send(text.into())
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Receive the next raw line without parsing.
    pub async fn receive_raw(&self) -> Result<String, TransportError> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(TransportError::Closed)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.tx.is_closed()
    }

    async fn send(&self, message: &Message) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.send_raw(message.to_json()?).await
    }

    async fn receive(&self) -> Result<Message, TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        let line = self.receive_raw().await?;
        Ok(Message::parse(&line)?)
    }

    async fn send_and_receive(&self, message: &Message) -> Result<Message, TransportError> {
        self.send(message).await?;
        self.receive().await
    }

    fn connection_info(&self) -> String {
        "in-process channel".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gangway_protocol::RpcId;

    #[tokio::test]
    async fn test_pair_exchange() {
        let (a, b) = ChannelTransport::pair();

        let request = Message::request(RpcId::Number(1), "ping", None);
        a.send(&request).await.unwrap();

        let received = b.receive().await.unwrap();
        assert_eq!(received.method(), Some("ping"));

        let response = Message::response(RpcId::Number(1), serde_json::json!({}));
        b.send(&response).await.unwrap();
        assert!(a.receive().await.unwrap().is_response());
    }

    #[tokio::test]
    async fn test_closed_peer_reports_closed() {
        let (a, b) = ChannelTransport::pair();
        drop(b);
        assert!(matches!(a.receive().await, Err(TransportError::Closed)));
        assert!(!a.is_connected());
    }

    #[tokio::test]
    async fn test_malformed_line_surfaces_as_protocol_error() {
        let (a, b) = ChannelTransport::pair();
        a.send_raw("{not json").await.unwrap();
        assert!(matches!(
            b.receive().await,
            Err(TransportError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_receive_awaits_until_queued() {
        let (a, b) = ChannelTransport::pair();
        let handle = tokio::spawn(async move { b.receive().await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        a.send(&Message::notification("notifications/progress", None))
            .await
            .unwrap();
        let received = handle.await.unwrap().unwrap();
        assert!(received.is_notification());
    }
}
