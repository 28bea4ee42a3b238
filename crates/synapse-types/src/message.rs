//! Message domain types for the Synapse bus.
//!
//! Defines the `Message` value exchanged between agents, together with its
//! classification enums (`MessageType`, `Priority`, `DeliveryMode`), the
//! broadcast `Subscription` record, and the `DeliveryReceipt` issued once a
//! message reaches all of its targets.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Recipient id that marks a message as a broadcast.
pub const BROADCAST_RECIPIENT: &str = "*";

/// Default time-to-live applied when a message carries no `expires_at`.
pub const DEFAULT_TTL_SECS: i64 = 300;

/// Classification of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Cognitive request addressed to a reasoning agent.
    AilCognition,
    /// Plain one-to-one message.
    DirectMessage,
    /// One-to-many announcement.
    Broadcast,
    /// Reply to an earlier message.
    Response,
    /// Liveness signal.
    Heartbeat,
    /// Runtime control traffic.
    System,
}

impl MessageType {
    pub const ALL: [MessageType; 6] = [
        MessageType::AilCognition,
        MessageType::DirectMessage,
        MessageType::Broadcast,
        MessageType::Response,
        MessageType::Heartbeat,
        MessageType::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::AilCognition => "ail_cognition",
            MessageType::DirectMessage => "direct_message",
            MessageType::Broadcast => "broadcast",
            MessageType::Response => "response",
            MessageType::Heartbeat => "heartbeat",
            MessageType::System => "system",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message priority. Higher values are dequeued first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low = 1,
    #[default]
    Normal = 2,
    High = 3,
    Urgent = 4,
}

impl Priority {
    /// Ordinal value (`LOW=1` .. `URGENT=4`).
    pub fn value(&self) -> u8 {
        *self as u8
    }
}

/// Delivery guarantee requested by the sender.
///
/// `ExactlyOnce` is accepted but handled exactly like `AtLeastOnce`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryMode {
    /// One attempt, no tracking, no retry.
    BestEffort,
    /// Tracked in the pending set and retried with backoff until delivered or exhausted.
    #[default]
    AtLeastOnce,
    ExactlyOnce,
}

impl DeliveryMode {
    /// Whether the bus keeps the message in its pending set until it settles.
    pub fn is_tracked(&self) -> bool {
        !matches!(self, DeliveryMode::BestEffort)
    }
}

/// An addressed unit of communication between agents.
///
/// `message_id` and `expires_at` may be left unset by the sender; the bus
/// stamps both when the message is accepted. The `content` payload is never
/// inspected by the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub sender_id: String,
    /// Target agent id, or `"*"` for a broadcast.
    pub recipient_id: String,
    pub message_type: MessageType,
    pub content: serde_json::Value,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub delivery_mode: DeliveryMode,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Agent id that should receive the handler's response, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl Message {
    /// Build a message with default priority and delivery mode.
    pub fn new(
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
        message_type: MessageType,
        content: serde_json::Value,
    ) -> Self {
        Self {
            message_id: None,
            sender_id: sender_id.into(),
            recipient_id: recipient_id.into(),
            message_type,
            content,
            priority: Priority::default(),
            delivery_mode: DeliveryMode::default(),
            metadata: HashMap::new(),
            timestamp: Utc::now(),
            expires_at: None,
            correlation_id: None,
            reply_to: None,
        }
    }

    /// Build a broadcast message (`recipient_id == "*"`).
    pub fn broadcast(
        sender_id: impl Into<String>,
        message_type: MessageType,
        content: serde_json::Value,
    ) -> Self {
        Self::new(sender_id, BROADCAST_RECIPIENT, message_type, content)
    }

    /// Build a `RESPONSE` to `original`, addressed to its `reply_to` (or its sender)
    /// and correlated with it.
    pub fn response_to(
        original: &Message,
        sender_id: impl Into<String>,
        content: serde_json::Value,
    ) -> Self {
        let recipient = original
            .reply_to
            .clone()
            .unwrap_or_else(|| original.sender_id.clone());
        let mut msg = Self::new(sender_id, recipient, MessageType::Response, content);
        msg.priority = original.priority;
        msg.correlation_id = original
            .correlation_id
            .clone()
            .or_else(|| original.message_id.clone());
        msg
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.delivery_mode = mode;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Expire `ttl` after the message timestamp.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expires_at = Some(self.timestamp + ttl);
        self
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_reply_to(mut self, agent_id: impl Into<String>) -> Self {
        self.reply_to = Some(agent_id.into());
        self
    }

    pub fn is_broadcast(&self) -> bool {
        self.recipient_id == BROADCAST_RECIPIENT
    }

    /// True once `now` is strictly past `expires_at`. Messages without a
    /// deadline never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| now > deadline)
    }

    /// Fill in `message_id` and `expires_at` when the sender left them unset.
    ///
    /// Returns the (possibly generated) message id.
    pub fn stamp(&mut self, default_ttl: Duration) -> String {
        if self.expires_at.is_none() {
            self.expires_at = Some(self.timestamp + default_ttl);
        }
        self.message_id
            .get_or_insert_with(|| Uuid::now_v7().to_string())
            .clone()
    }
}

/// A broadcast subscription held by one agent.
///
/// Subscriptions only widen which broadcasts an agent receives; delivery always
/// goes through the agent's registered handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub subscriber_id: String,
    pub message_types: BTreeSet<MessageType>,
    /// Glob matched against the routing key (`"{sender_id}.{message_type}"`).
    /// `None` accepts every broadcast of the subscribed types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_pattern: Option<String>,
}

impl Subscription {
    pub fn new(
        subscriber_id: impl Into<String>,
        message_types: impl IntoIterator<Item = MessageType>,
    ) -> Self {
        Self {
            subscriber_id: subscriber_id.into(),
            message_types: message_types.into_iter().collect(),
            routing_pattern: None,
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.routing_pattern = Some(pattern.into());
        self
    }

    pub fn accepts_type(&self, message_type: MessageType) -> bool {
        self.message_types.contains(&message_type)
    }
}

/// Proof of delivery recorded on an envelope once every target received it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub delivered_at: DateTime<Utc>,
    pub targets: Vec<String>,
    pub attempts: u32,
}
