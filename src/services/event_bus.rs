//! Typed broadcast channels with sequence numbering.
//!
//! One channel exists per event category (progress, swarm, diagnostics),
//! so consumers attach to exactly what they need. Publishing never fails:
//! events published with no subscriber attached are dropped.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Monotonically increasing sequence number assigned on publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub sequence: SequenceNumber,
    pub payload: T,
}

/// Broadcast channel for one event category.
#[derive(Debug)]
pub struct EventChannel<T: Clone> {
    sender: broadcast::Sender<Envelope<T>>,
    sequence: Arc<AtomicU64>,
}

impl<T: Clone> Clone for EventChannel<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            sequence: Arc::clone(&self.sequence),
        }
    }
}

impl<T: Clone + Send + 'static> EventChannel<T> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish an event and return its sequence number.
    pub fn publish(&self, payload: T) -> SequenceNumber {
        let sequence = SequenceNumber(self.sequence.fetch_add(1, Ordering::SeqCst));
        // No receivers is not an error
        let _ = self.sender.send(Envelope { sequence, payload });
        sequence
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope<T>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Number of events published so far.
    pub fn published(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}
