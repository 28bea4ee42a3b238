//! Broadcast channel for message lifecycle events.
//!
//! Publishing with no subscribers is a no-op. Slow subscribers lag rather
//! than slow the bus down: they see `RecvError::Lagged` and skip ahead.

use synapse_types::event::BusEvent;
use tokio::sync::broadcast;
use tracing::trace;

/// Multi-consumer stream of `BusEvent`s. Clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }

    /// Returns how many subscribers will see the event.
    pub fn publish(&self, event: BusEvent) -> usize {
        trace!(kind = event.kind(), message_id = event.message_id(), "bus event");
        self.sender.send(event).unwrap_or(0)
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}
