//! Delivery counters behind `MessageBus::get_statistics`.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
struct RunningAverage {
    mean_secs: f64,
    samples: u64,
}

#[derive(Default)]
pub struct DeliveryStats {
    sent: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    active_workers: AtomicUsize,
    delivery_time: Mutex<RunningAverage>,
}

impl DeliveryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one successful handler invocation taking `elapsed` since acceptance.
    pub fn record_delivery(&self, elapsed: Duration) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        let mut avg = self.delivery_time.lock().expect("stats lock poisoned");
        avg.samples += 1;
        avg.mean_secs += (elapsed.as_secs_f64() - avg.mean_secs) / avg.samples as f64;
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark a worker as live until the returned guard is dropped.
    pub fn worker_started(&self) -> ActiveWorker<'_> {
        self.active_workers.fetch_add(1, Ordering::Relaxed);
        ActiveWorker { stats: self }
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::Relaxed)
    }

    pub fn average_delivery_secs(&self) -> f64 {
        self.delivery_time.lock().expect("stats lock poisoned").mean_secs
    }
}

pub struct ActiveWorker<'a> {
    stats: &'a DeliveryStats,
}

impl Drop for ActiveWorker<'_> {
    fn drop(&mut self) {
        self.stats.active_workers.fetch_sub(1, Ordering::Relaxed);
    }
}
