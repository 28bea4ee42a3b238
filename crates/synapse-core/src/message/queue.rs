//! Bounded priority queue shared by the delivery workers.
//!
//! Envelopes are ordered by priority (highest first) and then by enqueue
//! sequence (earliest first). Capacity is enforced with a pair of semaphores:
//! `slots` counts free space and `items` counts queued envelopes, so `put`
//! waits for space and `get` waits for work without holding the heap lock
//! across an await point.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use synapse_types::error::BusError;
use synapse_types::message::Priority;
use tokio::sync::Semaphore;

use super::envelope::MessageEnvelope;

/// Heap entry: max-heap by priority, then min by sequence.
struct QueueEntry {
    priority: Priority,
    sequence: u64,
    envelope: MessageEnvelope,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Thread-safe, bounded priority queue of envelopes.
pub struct PriorityQueue {
    heap: Mutex<BinaryHeap<QueueEntry>>,
    slots: Semaphore,
    items: Semaphore,
    sequence: AtomicU64,
    capacity: usize,
}

impl PriorityQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            heap: Mutex::new(BinaryHeap::with_capacity(capacity.min(1024))),
            slots: Semaphore::new(capacity),
            items: Semaphore::new(0),
            sequence: AtomicU64::new(0),
            capacity,
        }
    }

    /// Enqueue, waiting for free space when the queue is full.
    pub async fn put(&self, envelope: MessageEnvelope) -> Result<(), BusError> {
        let permit = self.slots.acquire().await.map_err(|_| BusError::QueueClosed)?;
        permit.forget();
        self.push(envelope);
        Ok(())
    }

    /// Enqueue without waiting. Hands the envelope back when the queue is full or closed.
    pub fn try_put(&self, envelope: MessageEnvelope) -> Result<(), MessageEnvelope> {
        match self.slots.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.push(envelope);
                Ok(())
            }
            Err(_) => Err(envelope),
        }
    }

    /// Dequeue the highest-priority envelope, waiting until one is available.
    ///
    /// Returns `None` once the queue is closed. Cancel-safe: dropping the
    /// future before it resolves loses nothing.
    pub async fn get(&self) -> Option<MessageEnvelope> {
        let permit = self.items.acquire().await.ok()?;
        permit.forget();
        let entry = self.heap.lock().expect("queue lock poisoned").pop();
        self.slots.add_permits(1);
        entry.map(|e| e.envelope)
    }

    /// Close the queue: waiting and future `put`/`get` calls fail.
    pub fn close(&self) {
        self.slots.close();
        self.items.close();
    }

    pub fn is_closed(&self) -> bool {
        self.items.is_closed()
    }

    pub fn len(&self) -> usize {
        self.heap.lock().expect("queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn push(&self, envelope: MessageEnvelope) {
        let entry = QueueEntry {
            priority: envelope.priority(),
            sequence: self.sequence.fetch_add(1, AtomicOrdering::Relaxed),
            envelope,
        };
        self.heap.lock().expect("queue lock poisoned").push(entry);
        self.items.add_permits(1);
    }
}

impl std::fmt::Debug for PriorityQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
