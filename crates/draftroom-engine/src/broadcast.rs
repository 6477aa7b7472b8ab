// Broadcast boundary: the narrow seam between the engine and whatever
// delivers updates to clients.

use thiserror::Error;
use tokio::sync::broadcast;

use crate::protocol::EngineEvent;

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("no subscribers connected")]
    NoSubscribers,

    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Receives every event the engine publishes.
///
/// Implementations must not block: the engine calls `notify` while holding
/// the session lock. Errors are logged and counted by the engine and never
/// affect the operation that produced the event.
pub trait BroadcastSink: Send + Sync {
    fn notify(&self, session_id: &str, event: &EngineEvent) -> Result<(), BroadcastError>;
}

/// An event tagged with the session it belongs to.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub session_id: String,
    pub event: EngineEvent,
}

/// Fans events out to any number of subscribers over a tokio broadcast
/// channel. Slow subscribers lag and skip events rather than blocking the
/// engine.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: broadcast::Sender<Envelope>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        ChannelSink { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }
}

impl BroadcastSink for ChannelSink {
    fn notify(&self, session_id: &str, event: &EngineEvent) -> Result<(), BroadcastError> {
        self.tx
            .send(Envelope {
                session_id: session_id.to_string(),
                event: event.clone(),
            })
            .map(|_| ())
            .map_err(|_| BroadcastError::NoSubscribers)
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl BroadcastSink for NullSink {
    fn notify(&self, _session_id: &str, _event: &EngineEvent) -> Result<(), BroadcastError> {
        Ok(())
    }
}
