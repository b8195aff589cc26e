//! Hand-off of completed events to the display side.
//!
//! Sinks are called from the target's own threads, right after the
//! correlation lock is released. They should return quickly: `ChannelSink`
//! is the one to use when rendering involves I/O.

use crate::error::{ProbeError, Result};
use crate::probe::event::CryptoEvent;
use log::{error, warn};
use std::sync::mpsc::Sender;
use std::sync::Mutex;

/// Receiver of completed correlations.
pub trait EventSink: Send + Sync {
    fn on_crypto_event(&self, event: CryptoEvent);
}

/// Logs each event as one JSON line at warn level.
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn on_crypto_event(&self, event: CryptoEvent) {
        match event.to_json() {
            Ok(json) => warn!("[*] Cipher called from => {}", json),
            Err(e) => error!("Failed to serialize event {}: {}", event.sequence, e),
        }
    }
}

/// Forwards events to another thread over a channel.
pub struct ChannelSink {
    sender: Sender<CryptoEvent>,
}

impl ChannelSink {
    pub fn new(sender: Sender<CryptoEvent>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelSink {
    fn on_crypto_event(&self, event: CryptoEvent) {
        if let Err(e) = self.sender.send(event) {
            error!("Event receiver is gone, dropping event {}", e.0.sequence);
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<CryptoEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out the events received so far, in arrival order.
    pub fn events(&self) -> Result<Vec<CryptoEvent>> {
        self.events
            .lock()
            .map(|events| events.clone())
            .map_err(|_| ProbeError::lock_poisoned("collected events"))
    }

    pub fn len(&self) -> usize {
        self.events.lock().map_or(0, |events| events.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for CollectingSink {
    fn on_crypto_event(&self, event: CryptoEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(e) => error!("Failed to acquire lock on collected events: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::mpsc;

    fn event(sequence: u64) -> CryptoEvent {
        CryptoEvent {
            sequence,
            thread_id: 1,
            captured_at: Utc::now(),
            action: None,
            payload: "0x".to_string(),
            algorithm: None,
            key: None,
            iv: None,
            nonce: None,
            secret: None,
        }
    }

    #[test]
    fn test_collecting_sink_keeps_order() {
        let sink = CollectingSink::new();
        assert!(sink.is_empty());
        sink.on_crypto_event(event(1));
        sink.on_crypto_event(event(2));
        let sequences: Vec<_> = sink.events().unwrap().iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
    }

    #[test]
    fn test_channel_sink_forwards() {
        let (tx, rx) = mpsc::channel();
        let sink = ChannelSink::new(tx);
        sink.on_crypto_event(event(3));
        assert_eq!(rx.recv().unwrap().sequence, 3);
    }

    #[test]
    fn test_log_sink_accepts_events() {
        LogSink.on_crypto_event(event(5));
    }

    #[test]
    fn test_channel_sink_survives_closed_receiver() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        ChannelSink::new(tx).on_crypto_event(event(4));
    }
}
