//! Rate guard for handler-generated responses.
//!
//! Responses are routed back through the bus automatically, so two agents
//! that answer each other's responses would loop forever. The guard caps how
//! many responses one `(sender, recipient)` pair may exchange per time
//! window; the counter resets when the window elapses. Pairs whose window has
//! lapsed are pruned on the next check, so the table only holds recently
//! active pairs.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

struct PairCounter {
    count: u32,
    window_start: Instant,
}

pub struct LoopGuard {
    max_rate: u32,
    window: Duration,
    pair_counters: DashMap<(String, String), PairCounter>,
}

impl LoopGuard {
    pub fn new(max_rate: u32, window: Duration) -> Self {
        Self {
            max_rate,
            window,
            pair_counters: DashMap::new(),
        }
    }

    /// Check and count one response from `sender` to `recipient`.
    ///
    /// Returns `Err(reason)` once the pair has used up its window.
    pub fn check(&self, sender: &str, recipient: &str) -> Result<(), String> {
        // Must run before `entry` below: retain locks every shard.
        self.prune_expired();

        let key = (sender.to_string(), recipient.to_string());
        let mut entry = self.pair_counters.entry(key).or_insert_with(|| PairCounter {
            count: 0,
            window_start: Instant::now(),
        });
        let counter = entry.value_mut();

        if counter.window_start.elapsed() >= self.window {
            counter.count = 0;
            counter.window_start = Instant::now();
        }

        if counter.count >= self.max_rate {
            return Err(format!(
                "reply rate exceeded: {} -> {} ({} responses in {:?})",
                sender, recipient, counter.count, self.window
            ));
        }

        counter.count += 1;
        Ok(())
    }

    /// Number of pairs with a live rate window.
    pub fn tracked_pairs(&self) -> usize {
        self.pair_counters.len()
    }

    fn prune_expired(&self) {
        let window = self.window;
        self.pair_counters
            .retain(|_, counter| counter.window_start.elapsed() < window);
    }
}

impl std::fmt::Debug for LoopGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopGuard")
            .field("max_rate", &self.max_rate)
            .field("window", &self.window)
            .field("active_pairs", &self.tracked_pairs())
            .finish()
    }
}
