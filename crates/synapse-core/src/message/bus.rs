//! Unified message bus: the public facade over queue, router and workers.
//!
//! `MessageBus` is a cheap-to-clone handle; every clone drives the same
//! queue, routing table and worker pool. The composition root creates one bus
//! and hands clones to every consumer.
//!
//! - `send` stamps the message, resolves targets, enqueues, and returns the
//!   message id as an acceptance receipt (never a delivery confirmation)
//! - `start`/`stop` manage N delivery workers plus one retry loop
//! - `events` exposes the lifecycle stream for callers that must correlate
//!   outcomes by message id

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use synapse_types::config::BusConfig;
use synapse_types::error::BusError;
use synapse_types::event::BusEvent;
use synapse_types::message::{DeliveryMode, Message, MessageType, Priority, Subscription};
use synapse_types::stats::BusStatistics;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::delivery;
use super::envelope::MessageEnvelope;
use super::guard::LoopGuard;
use super::handler::{BoxMessageHandler, MessageHandler};
use super::pending::PendingTable;
use super::queue::PriorityQueue;
use super::retry;
use super::router::Router;
use super::stats::DeliveryStats;
use crate::event::EventBus;

/// Running worker tasks and the token that stops them.
struct WorkerPool {
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    retry: JoinHandle<()>,
}

/// State shared between the facade, the workers and the retry loop.
pub(crate) struct BusShared {
    pub(crate) config: BusConfig,
    pub(crate) queue: PriorityQueue,
    pub(crate) router: Router,
    pub(crate) pending: PendingTable,
    pub(crate) stats: DeliveryStats,
    pub(crate) events: EventBus,
    pub(crate) reply_guard: LoopGuard,
    /// Outstanding `request` calls keyed by correlation id.
    reply_waiters: DashMap<String, oneshot::Sender<Message>>,
    pool: Mutex<Option<WorkerPool>>,
}

impl BusShared {
    pub(crate) async fn send(&self, message: Message) -> Result<String, BusError> {
        if self.queue.is_closed() {
            return Err(BusError::QueueClosed);
        }
        let envelope = MessageEnvelope::new(
            message,
            self.config.max_attempts,
            self.config.default_ttl(),
        );
        let message_id = envelope.message_id().to_string();

        if let Some(waiter) = self.take_reply_waiter(envelope.message()) {
            self.stats.record_sent();
            if waiter.send(envelope.into_message()).is_err() {
                debug!(%message_id, "requester gave up before the response arrived");
            }
            return Ok(message_id);
        }

        let targets = self.router.route(envelope.message());
        if targets.is_empty() {
            debug!(
                %message_id,
                recipient = %envelope.message().recipient_id,
                message_type = %envelope.message().message_type,
                "no route for message, dropping"
            );
            self.events.publish(BusEvent::Undeliverable {
                message_id: message_id.clone(),
                recipient_id: envelope.message().recipient_id.clone(),
            });
            return Ok(message_id);
        }

        let tracked = envelope.is_tracked();
        if tracked && !self.pending.track(&message_id) {
            return Err(BusError::DuplicateMessageId(message_id));
        }

        if let Err(err) = self.queue.put(envelope).await {
            if tracked {
                self.pending.settle(&message_id);
            }
            return Err(err);
        }

        self.stats.record_sent();
        debug!(%message_id, targets = targets.len(), "message enqueued");
        self.events.publish(BusEvent::Accepted {
            message_id: message_id.clone(),
            targets: targets.len(),
        });
        Ok(message_id)
    }

    fn take_reply_waiter(&self, message: &Message) -> Option<oneshot::Sender<Message>> {
        if message.message_type != MessageType::Response {
            return None;
        }
        let correlation_id = message.correlation_id.as_deref()?;
        self.reply_waiters
            .remove(correlation_id)
            .map(|(_, waiter)| waiter)
    }
}

/// Handle to a message bus instance.
#[derive(Clone)]
pub struct MessageBus {
    shared: Arc<BusShared>,
}

impl MessageBus {
    /// Create a stopped bus. Call [`MessageBus::start`] to begin delivery.
    pub fn new(config: BusConfig) -> Result<Self, BusError> {
        config.validate()?;
        let shared = BusShared {
            queue: PriorityQueue::new(config.queue_capacity),
            router: Router::new(),
            pending: PendingTable::new(),
            stats: DeliveryStats::new(),
            events: EventBus::new(config.event_capacity),
            reply_guard: LoopGuard::new(config.reply_rate_limit, config.reply_window()),
            reply_waiters: DashMap::new(),
            pool: Mutex::new(None),
            config,
        };
        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    pub fn config(&self) -> &BusConfig {
        &self.shared.config
    }

    /// Spawn `worker_count` delivery workers and the retry loop.
    ///
    /// Must be called from within a Tokio runtime. Returns `false` if the bus
    /// was already running or has been closed.
    pub fn start(&self, worker_count: usize) -> bool {
        let mut pool = self.shared.pool.lock().expect("worker pool lock poisoned");
        if self.shared.queue.is_closed() {
            warn!("message bus is closed, not starting");
            return false;
        }
        if pool.is_some() {
            debug!("message bus already running");
            return false;
        }

        let worker_count = worker_count.max(1);
        let cancel = CancellationToken::new();
        let workers = (0..worker_count)
            .map(|worker_id| {
                tokio::spawn(delivery::run_worker(
                    Arc::clone(&self.shared),
                    worker_id,
                    cancel.child_token(),
                ))
            })
            .collect();
        let retry = tokio::spawn(retry::run_retry_loop(
            Arc::clone(&self.shared),
            cancel.child_token(),
        ));

        *pool = Some(WorkerPool {
            cancel,
            workers,
            retry,
        });
        info!(workers = worker_count, "message bus started");
        true
    }

    /// Stop the workers and the retry loop.
    ///
    /// Workers finish the handler they are running; any still busy after the
    /// configured grace period are aborted and their envelopes parked for
    /// retry. Queued and parked envelopes stay put and resume on the next
    /// `start`. Returns `false` if the bus was not running.
    pub async fn stop(&self) -> bool {
        let pool = self
            .shared
            .pool
            .lock()
            .expect("worker pool lock poisoned")
            .take();
        let Some(pool) = pool else {
            return false;
        };

        pool.cancel.cancel();
        let mut handles = pool.workers;
        handles.push(pool.retry);

        let grace = self.shared.config.shutdown_grace();
        if tokio::time::timeout(grace, futures_util::future::join_all(handles.iter_mut()))
            .await
            .is_err()
        {
            warn!(?grace, "workers still busy after grace period, aborting");
            for handle in &handles {
                handle.abort();
            }
            // Aborted workers re-park their envelope on drop; wait for that.
            // Handles that already completed must not be polled again.
            let unfinished = handles.into_iter().filter(|h| !h.is_finished());
            futures_util::future::join_all(unfinished).await;
        }
        info!("message bus stopped");
        true
    }

    /// Stop the bus for good.
    ///
    /// Runs [`MessageBus::stop`], then closes the queue: senders waiting for
    /// space and every later `send` fail with [`BusError::QueueClosed`], and
    /// `start` refuses to run again.
    pub async fn close(&self) {
        self.stop().await;
        self.shared.queue.close();
        info!(
            queued = self.shared.queue.len(),
            pending = self.shared.pending.len(),
            "message bus closed"
        );
    }

    pub fn is_running(&self) -> bool {
        self.shared
            .pool
            .lock()
            .expect("worker pool lock poisoned")
            .is_some()
    }

    /// Bind `handler` to `agent_id`. Re-registering replaces the handler.
    pub fn register_agent<H: MessageHandler>(&self, agent_id: impl Into<String>, handler: H) {
        self.register_boxed(agent_id, Arc::new(handler));
    }

    pub fn register_boxed(&self, agent_id: impl Into<String>, handler: BoxMessageHandler) {
        let agent_id = agent_id.into();
        if self.shared.router.register(agent_id.clone(), handler) {
            info!(%agent_id, "agent re-registered, handler replaced");
        } else {
            info!(%agent_id, "agent registered");
        }
    }

    /// Remove the agent and its subscriptions. Messages already queued for it
    /// are dropped at delivery time.
    pub fn unregister_agent(&self, agent_id: &str) -> bool {
        let removed = self.shared.router.unregister(agent_id);
        if removed {
            info!(%agent_id, "agent unregistered");
        }
        removed
    }

    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.shared.router.is_registered(agent_id)
    }

    /// Subscribe a registered agent to broadcasts of `message_types`, optionally
    /// narrowed by a glob over the routing key (`"{sender_id}.{message_type}"`).
    pub fn subscribe(
        &self,
        subscriber_id: impl Into<String>,
        message_types: impl IntoIterator<Item = MessageType>,
        routing_pattern: Option<&str>,
    ) -> Result<(), BusError> {
        let mut subscription = Subscription::new(subscriber_id, message_types);
        subscription.routing_pattern = routing_pattern.map(str::to_string);
        self.shared.router.subscribe(subscription)
    }

    /// Drop all of the agent's subscriptions, or only the listed types.
    pub fn unsubscribe(&self, subscriber_id: &str, message_types: Option<&[MessageType]>) -> usize {
        self.shared.router.unsubscribe(subscriber_id, message_types)
    }

    pub fn subscriptions(&self, agent_id: &str) -> Vec<Subscription> {
        self.shared.router.subscriptions(agent_id)
    }

    /// Accept a message for asynchronous delivery and return its id.
    ///
    /// Waits for queue space when the queue is full. A message with no
    /// current route is dropped (see [`BusEvent::Undeliverable`]) but still
    /// returns its id.
    pub async fn send(&self, message: Message) -> Result<String, BusError> {
        self.shared.send(message).await
    }

    /// Send a cognitive request to one agent.
    pub async fn send_ail_cognition(
        &self,
        sender_id: &str,
        recipient_id: &str,
        cognition: serde_json::Value,
        priority: Priority,
    ) -> Result<String, BusError> {
        let message = Message::new(sender_id, recipient_id, MessageType::AilCognition, cognition)
            .with_priority(priority);
        self.send(message).await
    }

    pub async fn send_direct_message(
        &self,
        sender_id: &str,
        recipient_id: &str,
        content: serde_json::Value,
        priority: Priority,
    ) -> Result<String, BusError> {
        let message = Message::new(sender_id, recipient_id, MessageType::DirectMessage, content)
            .with_priority(priority);
        self.send(message).await
    }

    /// Broadcast to every subscriber of `message_type` (default `BROADCAST`).
    pub async fn broadcast_message(
        &self,
        sender_id: &str,
        content: serde_json::Value,
        message_type: Option<MessageType>,
    ) -> Result<String, BusError> {
        let message = Message::broadcast(
            sender_id,
            message_type.unwrap_or(MessageType::Broadcast),
            content,
        );
        self.send(message).await
    }

    /// Broadcast a low-priority, best-effort liveness signal.
    pub async fn send_heartbeat(
        &self,
        sender_id: &str,
        content: serde_json::Value,
    ) -> Result<String, BusError> {
        let message = Message::broadcast(sender_id, MessageType::Heartbeat, content)
            .with_priority(Priority::Low)
            .with_delivery_mode(DeliveryMode::BestEffort);
        self.send(message).await
    }

    /// Send `message` and wait for the correlated `RESPONSE`.
    ///
    /// The message gets a correlation id (its own id unless one is set) and a
    /// `reply_to` of its sender unless one is set. The first `RESPONSE`
    /// carrying that correlation id completes the request and is not routed
    /// any further. A second request reusing a correlation id that is still
    /// awaiting its response is rejected with [`BusError::DuplicateMessageId`].
    pub async fn request(&self, mut message: Message, timeout: Duration) -> Result<Message, BusError> {
        let message_id = message
            .message_id
            .get_or_insert_with(|| Uuid::now_v7().to_string())
            .clone();
        let correlation_id = message
            .correlation_id
            .get_or_insert_with(|| message_id.clone())
            .clone();
        if message.reply_to.is_none() {
            message.reply_to = Some(message.sender_id.clone());
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        match self.shared.reply_waiters.entry(correlation_id.clone()) {
            Entry::Occupied(_) => return Err(BusError::DuplicateMessageId(correlation_id)),
            Entry::Vacant(entry) => {
                entry.insert(reply_tx);
            }
        }

        if let Err(err) = self.send(message).await {
            self.shared.reply_waiters.remove(&correlation_id);
            return Err(err);
        }

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(BusError::ReplyChannelClosed),
            Err(_) => {
                self.shared.reply_waiters.remove(&correlation_id);
                Err(BusError::Timeout(timeout))
            }
        }
    }

    /// Subscribe to message lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<BusEvent> {
        self.shared.events.subscribe()
    }

    pub fn get_statistics(&self) -> BusStatistics {
        let shared = &self.shared;
        BusStatistics {
            messages_sent: shared.stats.sent(),
            messages_delivered: shared.stats.delivered(),
            messages_failed: shared.stats.failed(),
            queue_size: shared.queue.len(),
            pending_messages: shared.pending.len(),
            registered_agents: shared.router.agent_count(),
            active_workers: shared.stats.active_workers(),
            average_delivery_time: shared.stats.average_delivery_secs(),
        }
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("registered_agents", &self.shared.router.agent_count())
            .field("queue_size", &self.shared.queue.len())
            .field("pending", &self.shared.pending.len())
            .field("running", &self.is_running())
            .finish()
    }
}
