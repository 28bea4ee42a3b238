//! Agent registry and message routing.
//!
//! Each registered agent has one record holding its handler and its broadcast
//! subscriptions. Direct messages resolve to the recipient when it is
//! registered; broadcasts resolve to every agent with a matching subscription.
//! Resolution always reads the live table, so the bus can re-route at delivery
//! time and honour agents that joined or left after a message was enqueued.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use synapse_types::error::BusError;
use synapse_types::message::{Message, MessageType, Subscription};
use tracing::debug;

use super::envelope::routing_key;
use super::handler::BoxMessageHandler;

/// Subscription with its routing pattern compiled once at subscribe time.
struct CompiledSubscription {
    subscription: Subscription,
    pattern: Option<glob::Pattern>,
}

impl CompiledSubscription {
    fn compile(subscription: Subscription) -> Result<Self, BusError> {
        let pattern = subscription
            .routing_pattern
            .as_deref()
            .map(|p| {
                glob::Pattern::new(p).map_err(|e| BusError::InvalidPattern {
                    pattern: p.to_string(),
                    reason: e.msg.to_string(),
                })
            })
            .transpose()?;
        Ok(Self {
            subscription,
            pattern,
        })
    }

    fn matches(&self, message_type: MessageType, routing_key: &str) -> bool {
        self.subscription.accepts_type(message_type)
            && self.pattern.as_ref().is_none_or(|p| p.matches(routing_key))
    }
}

/// Everything the bus knows about one agent.
struct AgentRecord {
    handler: BoxMessageHandler,
    subscriptions: Vec<CompiledSubscription>,
}

/// Live routing table shared by the bus facade and its workers.
#[derive(Default)]
pub struct Router {
    agents: DashMap<String, AgentRecord>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent as a direct-delivery target.
    ///
    /// Re-registering replaces the handler and keeps existing subscriptions.
    /// Returns `true` if an earlier registration was replaced.
    pub fn register(&self, agent_id: impl Into<String>, handler: BoxMessageHandler) -> bool {
        let agent_id = agent_id.into();
        match self.agents.entry(agent_id.clone()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().handler = handler;
                debug!(%agent_id, "replaced agent handler");
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(AgentRecord {
                    handler,
                    subscriptions: Vec::new(),
                });
                debug!(%agent_id, "registered agent");
                false
            }
        }
    }

    /// Remove an agent and all of its subscriptions.
    pub fn unregister(&self, agent_id: &str) -> bool {
        let removed = self.agents.remove(agent_id).is_some();
        if removed {
            debug!(%agent_id, "unregistered agent");
        }
        removed
    }

    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.agents.contains_key(agent_id)
    }

    /// Clone out the agent's handler so it can be invoked without holding the table lock.
    pub fn handler(&self, agent_id: &str) -> Option<BoxMessageHandler> {
        self.agents.get(agent_id).map(|r| r.handler.clone())
    }

    /// Add a broadcast subscription for a registered agent.
    pub fn subscribe(&self, subscription: Subscription) -> Result<(), BusError> {
        let compiled = CompiledSubscription::compile(subscription)?;
        let subscriber_id = compiled.subscription.subscriber_id.clone();
        let mut record = self
            .agents
            .get_mut(&subscriber_id)
            .ok_or_else(|| BusError::NotRegistered(subscriber_id.clone()))?;
        record.subscriptions.push(compiled);
        debug!(%subscriber_id, count = record.subscriptions.len(), "added subscription");
        Ok(())
    }

    /// Drop subscriptions for `subscriber_id`.
    ///
    /// With `None` every subscription goes; otherwise only the listed types
    /// are removed and subscriptions left with no types are dropped. Returns
    /// the number of subscriptions removed entirely.
    pub fn unsubscribe(&self, subscriber_id: &str, message_types: Option<&[MessageType]>) -> usize {
        let Some(mut record) = self.agents.get_mut(subscriber_id) else {
            return 0;
        };
        let before = record.subscriptions.len();
        match message_types {
            None => record.subscriptions.clear(),
            Some(types) => {
                for compiled in record.subscriptions.iter_mut() {
                    for t in types {
                        compiled.subscription.message_types.remove(t);
                    }
                }
                record
                    .subscriptions
                    .retain(|c| !c.subscription.message_types.is_empty());
            }
        }
        before - record.subscriptions.len()
    }

    pub fn subscriptions(&self, agent_id: &str) -> Vec<Subscription> {
        self.agents
            .get(agent_id)
            .map(|r| r.subscriptions.iter().map(|c| c.subscription.clone()).collect())
            .unwrap_or_default()
    }

    /// Resolve the agents that should receive `message` right now.
    ///
    /// The result is sorted, which fixes per-target delivery order within a
    /// worker.
    pub fn route(&self, message: &Message) -> Vec<String> {
        if !message.is_broadcast() {
            return if self.is_registered(&message.recipient_id) {
                vec![message.recipient_id.clone()]
            } else {
                Vec::new()
            };
        }

        let key = routing_key(message);
        let mut targets: Vec<String> = self
            .agents
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .subscriptions
                    .iter()
                    .any(|c| c.matches(message.message_type, &key))
            })
            .map(|entry| entry.key().clone())
            .collect();
        targets.sort();
        targets
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("agents", &self.agents.len())
            .finish()
    }
}
