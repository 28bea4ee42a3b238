//! Delivery lifecycle events published by the bus.
//!
//! Senders get a `message_id` back from `send`, never a delivery confirmation.
//! Code that needs to know what happened to a message subscribes to the bus
//! event stream and correlates on `message_id`.

use serde::{Deserialize, Serialize};

use crate::message::DeliveryReceipt;

/// Lifecycle event for a single message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusEvent {
    /// Message accepted and enqueued for `targets` agents.
    Accepted { message_id: String, targets: usize },

    /// No registered target at send time; the message was dropped.
    Undeliverable {
        message_id: String,
        recipient_id: String,
    },

    /// Every target received the message.
    Delivered {
        message_id: String,
        receipt: DeliveryReceipt,
    },

    /// One target's handler failed.
    HandlerFailed {
        message_id: String,
        agent_id: String,
        error: String,
    },

    /// Another attempt will be made after `delay_ms`.
    RetryScheduled {
        message_id: String,
        attempt: u32,
        delay_ms: u64,
    },

    /// Deadline passed before delivery. Not counted as a failure.
    Expired { message_id: String },

    /// Attempts exhausted (or a best-effort message failed).
    Failed { message_id: String, attempts: u32 },
}

impl BusEvent {
    pub fn message_id(&self) -> &str {
        match self {
            BusEvent::Accepted { message_id, .. }
            | BusEvent::Undeliverable { message_id, .. }
            | BusEvent::Delivered { message_id, .. }
            | BusEvent::HandlerFailed { message_id, .. }
            | BusEvent::RetryScheduled { message_id, .. }
            | BusEvent::Expired { message_id }
            | BusEvent::Failed { message_id, .. } => message_id,
        }
    }

    /// Short snake_case name of the variant, matching the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            BusEvent::Accepted { .. } => "accepted",
            BusEvent::Undeliverable { .. } => "undeliverable",
            BusEvent::Delivered { .. } => "delivered",
            BusEvent::HandlerFailed { .. } => "handler_failed",
            BusEvent::RetryScheduled { .. } => "retry_scheduled",
            BusEvent::Expired { .. } => "expired",
            BusEvent::Failed { .. } => "failed",
        }
    }

    /// Whether the message reached a final state with this event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BusEvent::Undeliverable { .. }
                | BusEvent::Delivered { .. }
                | BusEvent::Expired { .. }
                | BusEvent::Failed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_event_tagged_serialization() {
        let event = BusEvent::RetryScheduled {
            message_id: "m-1".to_string(),
            attempt: 1,
            delay_ms: 2_000,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"retry_scheduled\""));
        assert!(json.contains("\"delay_ms\":2000"));
        assert!(json.contains(&format!("\"type\":\"{}\"", event.kind())));
    }

    #[test]
    fn test_terminal_events() {
        let delivered = BusEvent::Delivered {
            message_id: "m-1".to_string(),
            receipt: DeliveryReceipt {
                delivered_at: Utc::now(),
                targets: vec!["b".to_string()],
                attempts: 1,
            },
        };
        assert!(delivered.is_terminal());
        assert_eq!(delivered.message_id(), "m-1");

        let failed_target = BusEvent::HandlerFailed {
            message_id: "m-2".to_string(),
            agent_id: "b".to_string(),
            error: "boom".to_string(),
        };
        assert!(!failed_target.is_terminal());
    }
}
