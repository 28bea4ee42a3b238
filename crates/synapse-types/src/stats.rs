use serde::{Deserialize, Serialize};

/// Point-in-time snapshot returned by `MessageBus::get_statistics`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusStatistics {
    pub messages_sent: u64,
    /// Successful handler invocations (one per target).
    pub messages_delivered: u64,
    pub messages_failed: u64,
    pub queue_size: usize,
    pub pending_messages: usize,
    pub registered_agents: usize,
    pub active_workers: usize,
    /// Running mean time from send to successful delivery, in seconds.
    pub average_delivery_time: f64,
}
