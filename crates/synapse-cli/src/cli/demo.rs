//! Simulated multi-agent traffic.
//!
//! Four agents share one bus:
//! - `planner` asks `solver` a question each round via request/response
//! - `solver` answers cognition requests
//! - `archivist` rejects the first delivery of every message, exercising retry
//! - `monitor` listens to heartbeat and system broadcasts

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use console::style;
use serde_json::json;
use synapse_core::message::HandlerResult;
use synapse_core::{MessageBus, MessageHandler, handler_fn};
use synapse_types::config::BusConfig;
use synapse_types::error::HandlerError;
use synapse_types::message::{Message, MessageType, Priority};
use tokio::sync::Mutex;

use super::status::{EventTally, print_statistics};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Fails the first delivery of each message id, accepts the retry.
#[derive(Default)]
struct Archivist {
    seen: Mutex<HashSet<String>>,
    archived: AtomicU64,
}

impl MessageHandler for Archivist {
    async fn handle(&self, message: &Message) -> HandlerResult {
        let id = message.message_id.clone().unwrap_or_default();
        if self.seen.lock().await.insert(id) {
            return Err(HandlerError::rejected("archive index warming up"));
        }
        self.archived.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }
}

#[derive(Default)]
struct Monitor {
    heartbeats: AtomicU64,
    system: AtomicU64,
}

impl MessageHandler for Monitor {
    async fn handle(&self, message: &Message) -> HandlerResult {
        match message.message_type {
            MessageType::Heartbeat => self.heartbeats.fetch_add(1, Ordering::Relaxed),
            _ => self.system.fetch_add(1, Ordering::Relaxed),
        };
        Ok(None)
    }
}

fn solve(content: &serde_json::Value) -> serde_json::Value {
    let a = content["a"].as_i64().unwrap_or_default();
    let b = content["b"].as_i64().unwrap_or_default();
    json!({ "sum": a + b })
}

/// Run the demo and print the resulting statistics.
pub async fn run_demo(config: BusConfig, rounds: u32, settle: Duration, json: bool) -> Result<()> {
    let workers = config.worker_count;
    let bus = MessageBus::new(config)?;

    let archivist = Arc::new(Archivist::default());
    let monitor = Arc::new(Monitor::default());

    bus.register_agent(
        "solver",
        handler_fn(|msg: Message| async move {
            let answer = solve(&msg.content);
            Ok(Some(Message::response_to(&msg, "solver", answer)))
        }),
    );
    bus.register_agent("planner", synapse_core::message::SinkHandler);
    bus.register_boxed("archivist", archivist.clone());
    bus.register_boxed("monitor", monitor.clone());
    bus.subscribe("monitor", [MessageType::Heartbeat, MessageType::System], None)?;
    bus.subscribe("archivist", [MessageType::System], Some("planner.*"))?;

    let tally = EventTally::spawn(&bus);
    bus.start(workers);

    let mut answered = 0u32;
    for round in 0..rounds {
        let question = Message::new(
            "planner",
            "solver",
            MessageType::AilCognition,
            json!({ "round": round, "a": round, "b": round * 2 }),
        )
        .with_priority(Priority::High);

        match bus.request(question, REQUEST_TIMEOUT).await {
            Ok(reply) => {
                answered += 1;
                tracing::info!(round, answer = %reply.content, "planner received answer");
            }
            Err(err) => tracing::warn!(round, error = %err, "planner request failed"),
        }

        bus.send_direct_message(
            "planner",
            "archivist",
            json!({ "round": round, "note": "plan revised" }),
            Priority::Normal,
        )
        .await?;
        bus.broadcast_message("planner", json!({ "round": round }), Some(MessageType::System))
            .await?;
        bus.send_heartbeat("solver", json!({ "round": round })).await?;
    }

    // Unknown recipient: dropped at send time.
    bus.send_direct_message("planner", "ghost", json!(null), Priority::Low)
        .await?;

    wait_until_idle(&bus, settle).await;
    bus.close().await;
    let events = tally.finish().await;

    if !json {
        println!();
        println!(
            "  {} Demo finished: {} of {} requests answered, {} archived, {} heartbeats, {} system broadcasts",
            style("⚡").bold(),
            style(answered).green(),
            rounds,
            archivist.archived.load(Ordering::Relaxed),
            monitor.heartbeats.load(Ordering::Relaxed),
            monitor.system.load(Ordering::Relaxed),
        );
    }
    print_statistics(&bus.get_statistics(), Some(&events), json)
}

/// Poll until nothing is queued or awaiting retry, or `limit` elapses.
pub async fn wait_until_idle(bus: &MessageBus, limit: Duration) {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let stats = bus.get_statistics();
        if stats.queue_size == 0 && stats.pending_messages == 0 {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            tracing::warn!(
                queued = stats.queue_size,
                pending = stats.pending_messages,
                "bus still busy, stopping anyway"
            );
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solver_adds_operands() {
        assert_eq!(solve(&json!({ "a": 2, "b": 40 })), json!({ "sum": 42 }));
        assert_eq!(solve(&json!({})), json!({ "sum": 0 }));
    }

    #[tokio::test(start_paused = true)]
    async fn archivist_accepts_on_retry() {
        let bus = MessageBus::new(BusConfig::default()).unwrap();
        let archivist = Arc::new(Archivist::default());
        bus.register_boxed("archivist", archivist.clone());
        bus.start(1);

        bus.send_direct_message("planner", "archivist", json!(null), Priority::Normal)
            .await
            .unwrap();
        wait_until_idle(&bus, Duration::from_secs(30)).await;
        bus.stop().await;

        assert_eq!(archivist.archived.load(Ordering::Relaxed), 1);
        let stats = bus.get_statistics();
        assert_eq!(stats.messages_delivered, 1);
        assert_eq!(stats.messages_failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn demo_runs_to_completion() {
        run_demo(BusConfig::default(), 2, Duration::from_secs(30), true)
            .await
            .unwrap();
    }
}
