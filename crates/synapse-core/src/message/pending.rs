//! Pending set for tracked (non-best-effort) messages.
//!
//! A message id enters the table when `send` accepts it and leaves exactly
//! once, when its envelope reaches a terminal state. While the envelope sits
//! in the queue or is being delivered the slot is `InFlight`; while it waits
//! for a retry the table owns the envelope itself.

use dashmap::DashMap;
use tokio::time::Instant;

use super::envelope::MessageEnvelope;

enum PendingSlot {
    InFlight,
    AwaitingRetry(MessageEnvelope),
}

#[derive(Default)]
pub struct PendingTable {
    slots: DashMap<String, PendingSlot>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `message_id`. Returns `false` if it is already tracked.
    pub fn track(&self, message_id: &str) -> bool {
        match self.slots.entry(message_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(PendingSlot::InFlight);
                true
            }
        }
    }

    /// Hand an envelope that awaits retry over to the table.
    pub fn park(&self, envelope: MessageEnvelope) {
        let id = envelope.message_id().to_string();
        self.slots.insert(id, PendingSlot::AwaitingRetry(envelope));
    }

    /// Stop tracking `message_id`. Returns `true` only for the call that removed it.
    pub fn settle(&self, message_id: &str) -> bool {
        self.slots.remove(message_id).is_some()
    }

    /// Take every parked envelope whose retry time has been reached.
    ///
    /// Their slots flip back to `InFlight`; the caller must requeue or re-park them.
    pub fn take_due(&self, now: Instant) -> Vec<MessageEnvelope> {
        let due: Vec<String> = self
            .slots
            .iter()
            .filter(|entry| matches!(entry.value(), PendingSlot::AwaitingRetry(env) if env.is_due(now)))
            .map(|entry| entry.key().clone())
            .collect();

        let mut taken = Vec::with_capacity(due.len());
        for id in due {
            if let Some(mut slot) = self.slots.get_mut(&id) {
                if let PendingSlot::AwaitingRetry(env) =
                    std::mem::replace(slot.value_mut(), PendingSlot::InFlight)
                {
                    taken.push(env);
                }
            }
        }
        taken
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.slots.contains_key(message_id)
    }

    pub fn is_awaiting_retry(&self, message_id: &str) -> bool {
        self.slots
            .get(message_id)
            .is_some_and(|slot| matches!(slot.value(), PendingSlot::AwaitingRetry(_)))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;
    use synapse_types::message::{Message, MessageType};

    fn envelope(id: &str) -> MessageEnvelope {
        let msg = Message::new("a", "b", MessageType::DirectMessage, json!(null)).with_id(id);
        MessageEnvelope::new(msg, 3, chrono::Duration::minutes(5))
    }

    #[test]
    fn track_rejects_duplicates() {
        let table = PendingTable::new();
        assert!(table.track("m-1"));
        assert!(!table.track("m-1"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn settle_removes_exactly_once() {
        let table = PendingTable::new();
        table.track("m-1");
        assert!(table.settle("m-1"));
        assert!(!table.settle("m-1"));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn take_due_returns_only_elapsed_retries() {
        let table = PendingTable::new();
        let now = Instant::now();

        let mut soon = envelope("soon");
        soon.record_failure(now, Duration::from_secs(1), true);
        let mut later = envelope("later");
        later.record_failure(now, Duration::from_secs(10), true);
        table.track("soon");
        table.track("later");
        table.track("busy");
        table.park(soon);
        table.park(later);

        assert!(table.take_due(now).is_empty());

        let due = table.take_due(now + Duration::from_secs(2));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].message_id(), "soon");

        // Taken envelopes stay tracked, now in flight again.
        assert!(table.contains("soon"));
        assert!(!table.is_awaiting_retry("soon"));
        assert!(table.is_awaiting_retry("later"));
        assert_eq!(table.len(), 3);
    }
}
