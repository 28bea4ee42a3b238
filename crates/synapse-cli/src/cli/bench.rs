//! Throughput benchmark: N messages fanned over M sink agents.

use std::time::{Duration, Instant};

use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use synapse_core::MessageBus;
use synapse_core::message::SinkHandler;
use synapse_types::config::BusConfig;
use synapse_types::message::Priority;

use super::status::{EventTally, print_statistics};

const PRIORITIES: [Priority; 4] = [Priority::Low, Priority::Normal, Priority::High, Priority::Urgent];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchReport {
    pub messages: usize,
    pub delivered: u64,
    pub elapsed: Duration,
}

impl BenchReport {
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.delivered as f64 / secs
    }
}

/// Send `messages` direct messages round-robin over `agents` sink agents and
/// wait until they are all delivered or `timeout` elapses.
pub async fn measure(
    bus: &MessageBus,
    messages: usize,
    agents: usize,
    timeout: Duration,
    progress: &ProgressBar,
) -> Result<BenchReport> {
    let agents = agents.max(1);
    let ids: Vec<String> = (0..agents).map(|i| format!("sink-{i}")).collect();
    for id in &ids {
        bus.register_agent(id.as_str(), SinkHandler);
    }

    let started = Instant::now();
    for i in 0..messages {
        let recipient = &ids[i % agents];
        bus.send_direct_message("bench", recipient, json!({ "seq": i }), PRIORITIES[i % PRIORITIES.len()])
            .await?;
    }

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let delivered = bus.get_statistics().messages_delivered;
        progress.set_position(delivered);
        if delivered >= messages as u64 || tokio::time::Instant::now() >= deadline {
            return Ok(BenchReport {
                messages,
                delivered,
                elapsed: started.elapsed(),
            });
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn run_bench(
    config: BusConfig,
    messages: usize,
    agents: usize,
    timeout: Duration,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let workers = config.worker_count;
    let bus = MessageBus::new(config)?;
    let tally = EventTally::spawn(&bus);
    bus.start(workers);

    let progress = if json || quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(messages as u64)
    };
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} delivered ({per_sec})")?
            .progress_chars("=> "),
    );

    let report = measure(&bus, messages, agents, timeout, &progress).await?;
    progress.finish_and_clear();
    bus.close().await;
    let events = tally.finish().await;

    if !json {
        println!();
        println!(
            "  {} {} messages to {} agents on {} workers in {:.2?}: {}",
            style("⚡").bold(),
            report.messages,
            agents.max(1),
            workers,
            report.elapsed,
            style(format!("{:.0} msg/s", report.throughput())).green().bold(),
        );
        if report.delivered < report.messages as u64 {
            println!(
                "  {} only {} delivered before the timeout",
                style("!").yellow().bold(),
                report.delivered
            );
        }
    }
    print_statistics(&bus.get_statistics(), Some(&events), json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn measure_delivers_everything() {
        let bus = MessageBus::new(BusConfig::default()).unwrap();
        bus.start(4);

        let report = measure(&bus, 200, 3, Duration::from_secs(10), &ProgressBar::hidden())
            .await
            .unwrap();
        bus.stop().await;

        assert_eq!(report.messages, 200);
        assert_eq!(report.delivered, 200);
        let stats = bus.get_statistics();
        assert_eq!(stats.registered_agents, 3);
        assert_eq!(stats.messages_failed, 0);
    }

    #[test]
    fn throughput_handles_zero_elapsed() {
        let report = BenchReport {
            messages: 10,
            delivered: 10,
            elapsed: Duration::ZERO,
        };
        assert_eq!(report.throughput(), 0.0);

        let report = BenchReport {
            elapsed: Duration::from_secs(2),
            ..report
        };
        assert_eq!(report.throughput(), 5.0);
    }
}
