//! Delivery-tracking envelope wrapped around every accepted `Message`.
//!
//! The envelope is owned by exactly one place at a time: the priority queue,
//! the worker delivering it, or the pending table while it waits for a retry.
//! That single ownership is what keeps attempt counting and terminal
//! bookkeeping free of double counting.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use synapse_types::message::{DeliveryReceipt, Message, Priority};
use tokio::time::Instant;

/// Where an envelope is in its delivery lifecycle.
///
/// `Delivered`, `Expired` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeState {
    Queued,
    Delivering,
    Delivered,
    AwaitingRetry,
    Expired,
    Failed,
}

impl EnvelopeState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EnvelopeState::Delivered | EnvelopeState::Expired | EnvelopeState::Failed
        )
    }
}

/// Outcome of recording a failed delivery pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again once `delay` has elapsed.
    Retry { attempt: u32, delay: Duration },
    /// No attempts left; the envelope is now `Failed`.
    Exhausted { attempts: u32 },
}

/// Build the diagnostic routing key for a message: `"{sender_id}.{message_type}"`.
///
/// Broadcast subscriptions match their routing pattern against this key.
pub fn routing_key(message: &Message) -> String {
    format!("{}.{}", message.sender_id, message.message_type)
}

/// Exponential backoff: `unit * 2^attempt`, saturating.
pub fn backoff_delay(unit: Duration, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    unit.saturating_mul(factor)
}

/// Mutable delivery state for one message.
#[derive(Debug)]
pub struct MessageEnvelope {
    message: Message,
    message_id: String,
    routing_key: String,
    delivery_attempts: u32,
    max_attempts: u32,
    next_retry: Option<Instant>,
    delivery_receipt: Option<DeliveryReceipt>,
    state: EnvelopeState,
    delivered_to: BTreeSet<String>,
    accepted_at: Instant,
}

impl MessageEnvelope {
    /// Wrap `message`, stamping a message id and deadline when missing.
    pub fn new(mut message: Message, max_attempts: u32, default_ttl: chrono::Duration) -> Self {
        let message_id = message.stamp(default_ttl);
        let routing_key = routing_key(&message);
        Self {
            message,
            message_id,
            routing_key,
            delivery_attempts: 0,
            max_attempts: max_attempts.max(1),
            next_retry: None,
            delivery_receipt: None,
            state: EnvelopeState::Queued,
            delivered_to: BTreeSet::new(),
            accepted_at: Instant::now(),
        }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn into_message(self) -> Message {
        self.message
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    pub fn priority(&self) -> Priority {
        self.message.priority
    }

    pub fn delivery_attempts(&self) -> u32 {
        self.delivery_attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn next_retry(&self) -> Option<Instant> {
        self.next_retry
    }

    pub fn delivery_receipt(&self) -> Option<&DeliveryReceipt> {
        self.delivery_receipt.as_ref()
    }

    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    pub fn is_tracked(&self) -> bool {
        self.message.delivery_mode.is_tracked()
    }

    /// Time since the bus accepted the message.
    pub fn age(&self) -> Duration {
        self.accepted_at.elapsed()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.message.is_expired_at(now)
    }

    /// Whether the scheduled retry time has been reached.
    pub fn is_due(&self, now: Instant) -> bool {
        self.state == EnvelopeState::AwaitingRetry && self.next_retry.is_some_and(|at| at <= now)
    }

    /// Targets from `targets` that have not yet received this message.
    pub fn outstanding(&self, targets: &[String]) -> Vec<String> {
        targets
            .iter()
            .filter(|t| !self.delivered_to.contains(*t))
            .cloned()
            .collect()
    }

    pub fn has_delivered_any(&self) -> bool {
        !self.delivered_to.is_empty()
    }

    pub fn mark_delivering(&mut self) {
        self.state = EnvelopeState::Delivering;
    }

    pub fn record_delivery(&mut self, agent_id: &str) {
        self.delivered_to.insert(agent_id.to_string());
    }

    /// Finish successfully and issue the receipt.
    pub fn mark_delivered(&mut self) -> &DeliveryReceipt {
        self.state = EnvelopeState::Delivered;
        self.next_retry = None;
        self.delivery_receipt.insert(DeliveryReceipt {
            delivered_at: Utc::now(),
            targets: self.delivered_to.iter().cloned().collect(),
            attempts: self.delivery_attempts + 1,
        })
    }

    pub fn mark_expired(&mut self) {
        self.state = EnvelopeState::Expired;
        self.next_retry = None;
    }

    /// Count one failed delivery pass.
    ///
    /// Attempts never exceed `max_attempts`. When `retryable` is false (a
    /// best-effort message) the envelope fails on its first failed pass.
    pub fn record_failure(&mut self, now: Instant, backoff_unit: Duration, retryable: bool) -> RetryDecision {
        self.delivery_attempts = (self.delivery_attempts + 1).min(self.max_attempts);

        if !retryable || self.delivery_attempts >= self.max_attempts {
            self.state = EnvelopeState::Failed;
            self.next_retry = None;
            return RetryDecision::Exhausted {
                attempts: self.delivery_attempts,
            };
        }

        let delay = backoff_delay(backoff_unit, self.delivery_attempts);
        self.next_retry = Some(now + delay);
        self.state = EnvelopeState::AwaitingRetry;
        RetryDecision::Retry {
            attempt: self.delivery_attempts,
            delay,
        }
    }

    /// Return to the queue for the next attempt.
    pub fn requeue(&mut self) {
        self.next_retry = None;
        self.state = EnvelopeState::Queued;
    }

    /// Put a due envelope back to waiting; it will be picked up on the next tick.
    pub fn defer(&mut self, now: Instant) {
        self.next_retry = Some(now);
        self.state = EnvelopeState::AwaitingRetry;
    }
}
