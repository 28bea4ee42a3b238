//! Delivery workers.
//!
//! Each worker pops the highest-priority envelope, re-resolves its targets
//! against the live routing table and calls every outstanding target's
//! handler in turn. No lock is held while a handler runs.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures_util::FutureExt;
use synapse_types::error::HandlerError;
use synapse_types::event::BusEvent;
use synapse_types::message::Message;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::bus::BusShared;
use super::envelope::{MessageEnvelope, RetryDecision};

pub(crate) async fn run_worker(shared: Arc<BusShared>, worker_id: usize, cancel: CancellationToken) {
    let _active = shared.stats.worker_started();
    debug!(worker_id, "delivery worker started");

    loop {
        let envelope = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = shared.queue.get() => match next {
                Some(envelope) => envelope,
                None => break,
            },
        };
        deliver(&shared, envelope).await;
    }

    debug!(worker_id, "delivery worker stopped");
}

/// How a delivery pass ended.
enum PassOutcome {
    Delivered,
    /// Every target went away before its handler ran.
    Undeliverable,
    Failed,
}

/// Owns an envelope while its handlers run.
///
/// A worker aborted mid-delivery drops this guard with the envelope still
/// inside; a tracked envelope is then parked as due so the retry loop picks
/// it up after the next `start`. Targets already served are not called again.
struct InFlight<'a> {
    shared: &'a BusShared,
    envelope: Option<MessageEnvelope>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let Some(mut envelope) = self.envelope.take() else {
            return;
        };
        let message_id = envelope.message_id().to_string();
        if envelope.is_tracked() {
            envelope.defer(Instant::now());
            self.shared.pending.park(envelope);
            warn!(%message_id, "delivery interrupted, parked for retry");
        } else {
            debug!(%message_id, "best-effort delivery interrupted, dropping");
        }
    }
}

/// Run one delivery pass for `envelope` and settle or park it.
pub(crate) async fn deliver(shared: &Arc<BusShared>, mut envelope: MessageEnvelope) {
    let message_id = envelope.message_id().to_string();

    if envelope.is_expired(Utc::now()) {
        envelope.mark_expired();
        if envelope.is_tracked() {
            shared.pending.settle(&message_id);
        }
        info!(%message_id, "message expired before delivery");
        shared.events.publish(BusEvent::Expired { message_id });
        return;
    }

    envelope.mark_delivering();
    let mut in_flight = InFlight {
        shared: shared.as_ref(),
        envelope: Some(envelope),
    };
    let outcome = match in_flight.envelope.as_mut() {
        Some(envelope) => run_pass(shared, envelope).await,
        None => return,
    };
    let Some(mut envelope) = in_flight.envelope.take() else {
        return;
    };

    match outcome {
        PassOutcome::Failed => handle_failure(shared, envelope),
        PassOutcome::Undeliverable => {
            if envelope.is_tracked() {
                shared.pending.settle(&message_id);
            }
            debug!(%message_id, "all targets gone before delivery, dropping");
            shared.events.publish(BusEvent::Undeliverable {
                message_id,
                recipient_id: envelope.message().recipient_id.clone(),
            });
        }
        PassOutcome::Delivered => {
            let receipt = envelope.mark_delivered().clone();
            if envelope.is_tracked() {
                shared.pending.settle(&message_id);
            }
            debug!(%message_id, targets = receipt.targets.len(), attempts = receipt.attempts, "message delivered");
            shared.events.publish(BusEvent::Delivered { message_id, receipt });
        }
    }
}

/// Call every outstanding target's handler once.
async fn run_pass(shared: &Arc<BusShared>, envelope: &mut MessageEnvelope) -> PassOutcome {
    let message_id = envelope.message_id().to_string();
    let targets = shared.router.route(envelope.message());
    let outstanding = envelope.outstanding(&targets);

    let mut failures = 0usize;
    for agent_id in &outstanding {
        // Unregistered since routing: nothing to deliver to.
        let Some(handler) = shared.router.handler(agent_id) else {
            continue;
        };

        let outcome = AssertUnwindSafe(handler.handle_boxed(envelope.message()))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(panic.as_ref()))));

        match outcome {
            Ok(response) => {
                envelope.record_delivery(agent_id);
                shared.stats.record_delivery(envelope.age());
                if let Some(response) = response {
                    dispatch_response(shared, agent_id, envelope.message(), response);
                }
            }
            Err(err) => {
                failures += 1;
                warn!(%message_id, %agent_id, error = %err, "handler failed");
                shared.events.publish(BusEvent::HandlerFailed {
                    message_id: message_id.clone(),
                    agent_id: agent_id.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    if failures > 0 {
        PassOutcome::Failed
    } else if envelope.has_delivered_any() {
        PassOutcome::Delivered
    } else {
        PassOutcome::Undeliverable
    }
}

fn handle_failure(shared: &BusShared, mut envelope: MessageEnvelope) {
    let message_id = envelope.message_id().to_string();
    let retryable = envelope.is_tracked();

    match envelope.record_failure(Instant::now(), shared.config.backoff_unit(), retryable) {
        RetryDecision::Retry { attempt, delay } => {
            info!(%message_id, attempt, ?delay, "delivery failed, retry scheduled");
            shared.pending.park(envelope);
            shared.events.publish(BusEvent::RetryScheduled {
                message_id,
                attempt,
                delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            });
        }
        RetryDecision::Exhausted { attempts } => {
            if retryable {
                shared.pending.settle(&message_id);
            }
            shared.stats.record_failure();
            warn!(%message_id, attempts, "message failed permanently");
            shared.events.publish(BusEvent::Failed {
                message_id,
                attempts,
            });
        }
    }
}

/// Route a handler's response back through the bus.
///
/// Only messages that carry `reply_to` get their responses routed. The send
/// runs on its own task so a worker never waits on queue capacity that only
/// workers can free.
fn dispatch_response(shared: &Arc<BusShared>, responder: &str, original: &Message, mut response: Message) {
    let Some(reply_to) = &original.reply_to else {
        debug!(%responder, "original has no reply_to, dropping response");
        return;
    };
    if reply_to.is_empty() {
        debug!(%responder, "empty reply_to, dropping response");
        return;
    }
    response.recipient_id = reply_to.clone();
    if response.correlation_id.is_none() {
        response.correlation_id = original
            .correlation_id
            .clone()
            .or_else(|| original.message_id.clone());
    }

    if let Err(reason) = shared.reply_guard.check(responder, &response.recipient_id) {
        warn!(%responder, recipient = %response.recipient_id, %reason, "response suppressed");
        return;
    }

    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        if let Err(err) = shared.send(response).await {
            warn!(error = %err, "failed to route handler response");
        }
    });
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
