//! Retry loop: moves due envelopes from the pending table back onto the queue.

use std::sync::Arc;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::bus::BusShared;

pub(crate) async fn run_retry_loop(shared: Arc<BusShared>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(shared.config.retry_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(interval = ?shared.config.retry_interval(), "retry loop started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let requeued = requeue_due(&shared, Instant::now());
                if requeued > 0 {
                    debug!(requeued, "requeued messages for retry");
                }
            }
        }
    }

    debug!("retry loop stopped");
}

/// Requeue every parked envelope whose retry time has passed.
///
/// An envelope that does not fit in a full queue goes back to the pending
/// table and is tried again on the next tick.
pub(crate) fn requeue_due(shared: &BusShared, now: Instant) -> usize {
    let mut requeued = 0;
    for mut envelope in shared.pending.take_due(now) {
        envelope.requeue();
        match shared.queue.try_put(envelope) {
            Ok(()) => requeued += 1,
            Err(mut envelope) => {
                trace!(message_id = %envelope.message_id(), "queue full, deferring retry");
                envelope.defer(now);
                shared.pending.park(envelope);
            }
        }
    }
    requeued
}
