//! Statistics rendering shared by `demo` and `bench`.

use std::collections::BTreeMap;

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use synapse_core::MessageBus;
use synapse_types::event::BusEvent;
use synapse_types::stats::BusStatistics;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Count bus events by kind until cancelled.
pub struct EventTally {
    cancel: CancellationToken,
    task: JoinHandle<BTreeMap<&'static str, u64>>,
}

impl EventTally {
    pub fn spawn(bus: &MessageBus) -> Self {
        let mut events = bus.events();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let mut counts = BTreeMap::new();
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(event) => record(&mut counts, &event),
                        Err(RecvError::Lagged(missed)) => {
                            tracing::debug!(missed, "event tally lagged");
                            *counts.entry("lagged").or_insert(0) += missed;
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            // Drain whatever was published before cancellation.
            while let Ok(event) = events.try_recv() {
                record(&mut counts, &event);
            }
            counts
        });
        Self { cancel, task }
    }

    pub async fn finish(self) -> BTreeMap<&'static str, u64> {
        self.cancel.cancel();
        self.task.await.unwrap_or_default()
    }
}

fn record(counts: &mut BTreeMap<&'static str, u64>, event: &BusEvent) {
    *counts.entry(event.kind()).or_insert(0) += 1;
}

/// Print a statistics snapshot, plus per-kind event counts when available.
pub fn print_statistics(
    stats: &BusStatistics,
    events: Option<&BTreeMap<&'static str, u64>>,
    json: bool,
) -> Result<()> {
    if json {
        let mut value = serde_json::to_value(stats)?;
        if let Some(events) = events {
            value["events"] = serde_json::to_value(events)?;
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!();
    println!("  {}", style("── Bus statistics ──").dim());
    println!("  Sent:        {}", style(stats.messages_sent).bold());
    println!("  Delivered:   {}", style(stats.messages_delivered).green());
    if stats.messages_failed > 0 {
        println!("  Failed:      {}", style(stats.messages_failed).red());
    } else {
        println!("  Failed:      {}", style(0).dim());
    }
    println!("  Queue size:  {}", stats.queue_size);
    if stats.pending_messages > 0 {
        println!("  Pending:     {}", style(stats.pending_messages).yellow());
    } else {
        println!("  Pending:     {}", stats.pending_messages);
    }
    println!("  Agents:      {}", stats.registered_agents);
    println!("  Workers:     {}", stats.active_workers);
    println!(
        "  Avg latency: {}",
        style(format!("{:.2} ms", stats.average_delivery_time * 1000.0)).cyan()
    );

    if let Some(events) = events.filter(|e| !e.is_empty()) {
        println!();
        let mut table = Table::new();
        table.load_preset(presets::UTF8_FULL_CONDENSED);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Event").fg(Color::White),
            Cell::new("Count").fg(Color::White),
        ]);
        for (kind, count) in events {
            let color = match *kind {
                "delivered" => Color::Green,
                "failed" | "handler_failed" => Color::Red,
                "retry_scheduled" | "expired" | "undeliverable" => Color::Yellow,
                _ => Color::Reset,
            };
            table.add_row(vec![Cell::new(kind).fg(color), Cell::new(count)]);
        }
        println!("{table}");
    }
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use synapse_core::message::SinkHandler;
    use synapse_types::config::BusConfig;
    use synapse_types::message::Priority;

    #[tokio::test]
    async fn tally_counts_events_by_kind() {
        let bus = MessageBus::new(BusConfig::default()).unwrap();
        bus.register_agent("b", SinkHandler);
        let tally = EventTally::spawn(&bus);

        bus.send_direct_message("a", "b", json!(null), Priority::Normal)
            .await
            .unwrap();
        bus.send_direct_message("a", "nobody", json!(null), Priority::Normal)
            .await
            .unwrap();

        let counts = tally.finish().await;
        assert_eq!(counts.get("accepted"), Some(&1));
        assert_eq!(counts.get("undeliverable"), Some(&1));
        assert_eq!(counts.get("delivered"), None);
    }

    #[test]
    fn json_output_includes_events() {
        let stats = BusStatistics::default();
        let mut events = BTreeMap::new();
        events.insert("delivered", 3);
        print_statistics(&stats, Some(&events), true).unwrap();
    }
}
