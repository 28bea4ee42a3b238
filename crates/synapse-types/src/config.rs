//! Bus configuration types.
//!
//! `BusConfig` mirrors the top level of `config.toml` and tunes the
//! worker pool, queue bound, retry timing and reply loop guard. Every field
//! has a default, so an empty file is a valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tuning knobs for a `MessageBus` instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Number of delivery workers spawned by `start` when no count is given.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Maximum number of envelopes waiting in the priority queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Delivery attempts before a message is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Lifetime applied to messages sent without `expires_at`.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Retry loop tick.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Backoff after attempt `k` is `backoff_unit * 2^k`.
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,

    /// How long `stop` waits for in-flight handlers before aborting workers.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Buffer of the delivery event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Handler responses allowed per (sender, recipient) pair per window.
    #[serde(default = "default_reply_rate_limit")]
    pub reply_rate_limit: u32,

    #[serde(default = "default_reply_window_secs")]
    pub reply_window_secs: u64,
}

fn default_worker_count() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    10_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_retry_interval_ms() -> u64 {
    1_000
}

fn default_backoff_unit_ms() -> u64 {
    1_000
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

fn default_event_capacity() -> usize {
    1_024
}

fn default_reply_rate_limit() -> u32 {
    10
}

fn default_reply_window_secs() -> u64 {
    60
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            max_attempts: default_max_attempts(),
            default_ttl_secs: default_ttl_secs(),
            retry_interval_ms: default_retry_interval_ms(),
            backoff_unit_ms: default_backoff_unit_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            event_capacity: default_event_capacity(),
            reply_rate_limit: default_reply_rate_limit(),
            reply_window_secs: default_reply_window_secs(),
        }
    }
}

impl BusConfig {
    /// Reject values that would leave the bus unable to make progress.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("worker_count", self.worker_count as u64),
            ("queue_capacity", self.queue_capacity as u64),
            ("max_attempts", self.max_attempts as u64),
            ("retry_interval_ms", self.retry_interval_ms),
            ("event_capacity", self.event_capacity as u64),
            ("reply_rate_limit", self.reply_rate_limit as u64),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.default_ttl_secs as i64)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn reply_window(&self) -> Duration {
        Duration::from_secs(self.reply_window_secs)
    }
}
