//! In-memory log ring with live subscribers.
//!
//! Backs the `/log/stream` SSE endpoint: a bounded buffer of recent lines
//! plus a broadcast channel for clients that attach mid-stream. Purely
//! advisory instrumentation; dropping lines is acceptable.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use tokio::sync::broadcast;

/// Number of recent lines retained for late subscribers.
const LOG_BUFFER_SIZE: usize = 500;

/// Capacity of the live-subscriber channel.
const LOG_CHANNEL_CAPACITY: usize = 256;

/// Bounded log sink with replay for new subscribers.
pub struct LogBuffer {
    lines: Mutex<VecDeque<String>>,
    tx: broadcast::Sender<String>,
}

impl LogBuffer {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        Self {
            lines: Mutex::new(VecDeque::with_capacity(LOG_BUFFER_SIZE)),
            tx,
        }
    }

    /// Append a line to the ring and fan it out to live subscribers.
    pub fn append(&self, line: impl Into<String>) {
        let line = sanitize(&line.into());

        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() == LOG_BUFFER_SIZE {
            lines.pop_front();
        }
        lines.push_back(line.clone());
        drop(lines);

        // No subscribers is fine; the ring still retains the line.
        let _ = self.tx.send(line);
    }

    /// Snapshot of the retained lines, oldest first.
    pub fn recent(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Subscribe to lines appended after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip characters that would corrupt an SSE frame.
fn sanitize(line: &str) -> String {
    line.chars()
        .filter(|c| *c != '\r' && *c != '\0' && *c != '\u{2028}' && *c != '\u{2029}')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_capacity() {
        let buf = LogBuffer::new();
        for i in 0..(LOG_BUFFER_SIZE + 10) {
            buf.append(format!("line {i}"));
        }
        let recent = buf.recent();
        assert_eq!(recent.len(), LOG_BUFFER_SIZE);
        assert_eq!(recent[0], "line 10");
        assert_eq!(recent[LOG_BUFFER_SIZE - 1], format!("line {}", LOG_BUFFER_SIZE + 9));
    }

    #[test]
    fn test_sanitize_strips_control_chars() {
        let buf = LogBuffer::new();
        buf.append("a\rb\0c");
        assert_eq!(buf.recent(), vec!["abc".to_string()]);
    }

    #[tokio::test]
    async fn test_subscriber_receives_appended_lines() {
        let buf = LogBuffer::new();
        buf.append("before subscribe");
        let mut rx = buf.subscribe();
        buf.append("after subscribe");
        assert_eq!(rx.recv().await.unwrap(), "after subscribe");
    }
}
