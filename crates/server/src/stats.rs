//! Atomic request counters and the status snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lock-free counters shared by every serving thread.
#[derive(Debug, Default)]
pub struct ServerStats {
    requests_received: AtomicU64,
    responses_sent: AtomicU64,
    errors_returned: AtomicU64,
}

impl ServerStats {
    pub fn record_request(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response(&self) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors_returned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_received(&self) -> u64 {
        self.requests_received.load(Ordering::Relaxed)
    }

    pub fn responses_sent(&self) -> u64 {
        self.responses_sent.load(Ordering::Relaxed)
    }

    pub fn errors_returned(&self) -> u64 {
        self.errors_returned.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of a server, serializable for a host's status
/// surface.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub state: String,
    pub transport: String,
    pub uptime_seconds: u64,
    pub requests_received: u64,
    pub responses_sent: u64,
    pub errors_returned: u64,
    pub tools: usize,
    pub resources: usize,
    pub prompts: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = ServerStats::default();
        stats.record_request();
        stats.record_request();
        stats.record_response();
        stats.record_error();
        assert_eq!(stats.requests_received(), 2);
        assert_eq!(stats.responses_sent(), 1);
        assert_eq!(stats.errors_returned(), 1);
    }
}
