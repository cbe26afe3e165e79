//! Benchmark Orchestration Module
//!
//! Runs the phases of a benchmark in order: subscribers, publishers, the
//! completion wait, teardown, and the final drain of the statistics funnel.

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::adapter::{ClientOptions, Connector, DISCONNECT_GRACE};
use crate::client::{subscriber, ActorState, Publisher, Subscriber};
use crate::config::Config;
use crate::envelope;
use crate::monitor::CompletionMonitor;
use crate::registry::ClientRegistry;
use crate::tracker::{Category, StatsAggregator, Statistics};

/// How long the statistics funnel may wait for straggling producers
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Headroom over the payload for MQTT packet framing
const PACKET_OVERHEAD: usize = 1024;

/// Benchmark error types
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("statistics aggregator failed: {0}")]
    Aggregator(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Subscriber,
    Publisher,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::Subscriber => "sub",
            Role::Publisher => "pub",
        }
    }
}

/// One benchmark run against one connector
pub struct Bench<C: Connector> {
    config: Config,
    connector: Arc<C>,
    poll_interval: Duration,
}

impl<C: Connector> Bench<C> {
    /// `config` is expected to have passed [`Config::validate`]
    pub fn new(config: Config, connector: C) -> Self {
        Self {
            config,
            connector: Arc::new(connector),
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Override the completion monitor poll interval
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Identity and connection settings for the `index`-th client of `role`
    pub fn client_options(&self, role: Role, index: usize) -> ClientOptions {
        let name = format!("{}/{}/{}", self.config.username, role.as_str(), index);
        let lost_id = name.clone();
        ClientOptions::new(self.config.broker.clone(), name.clone())
            .with_credentials(name, self.config.password.clone())
            .with_max_packet_size(self.config.payload_size + PACKET_OVERHEAD)
            .on_connection_lost(Arc::new(move |reason: &str| {
                log::warn!("Client {:?} lost connection: {}", lost_id, reason);
            }))
    }

    fn base_topic(&self, index: usize) -> String {
        format!("{}/{}", self.config.topic, index)
    }

    pub async fn run(self) -> Result<Statistics, BenchError> {
        // Pin the envelope clock origin before any payload is stamped.
        envelope::monotonic_nanos();

        let (sink, aggregator) = StatsAggregator::spawn();
        let registry = ClientRegistry::spawn(DISCONNECT_GRACE);
        let pairs = self.config.pairs();
        let interval = self.config.interval();

        log::info!("Creating {} subscribers ...", pairs);
        let mut handles = Vec::with_capacity(pairs);
        for i in 0..pairs {
            let mut options = self.client_options(Role::Subscriber, i);
            let handler = subscriber::inbound_handler(options.client_id.clone(), sink.clone());
            options = options.on_message(handler);

            let actor = Subscriber::new(
                options,
                self.base_topic(i),
                self.config.qos,
                self.config.message_count,
                interval,
            );
            handles.push(tokio::spawn(actor.run(self.connector.clone(), registry.clone(), sink.clone())));
            tokio::time::sleep(interval).await;
        }
        let (running, failed) = settle(handles).await;
        log::info!("All topics subscribed ({} subscribers up, {} failed).", running, failed);

        log::info!("Creating {} publishers ...", pairs);
        let mut handles = Vec::with_capacity(pairs);
        for i in 0..pairs {
            let actor = Publisher::new(
                self.client_options(Role::Publisher, i),
                self.base_topic(i),
                self.config.qos,
                self.config.message_count,
                self.config.payload_size,
                interval,
            );
            handles.push(tokio::spawn(actor.run(self.connector.clone(), registry.clone(), sink.clone())));
            tokio::time::sleep(interval).await;
        }
        let (running, failed) = settle(handles).await;
        log::info!("All messages published ({} publishers up, {} failed).", running, failed);

        let monitor = CompletionMonitor::new(aggregator.progress()).with_poll_interval(self.poll_interval);
        monitor.wait_until_caught_up(self.config.wait_rounds).await;

        registry.shutdown_all().await;
        drop(sink);
        let statistics = aggregator.finish(DRAIN_GRACE).await?;

        log::info!(
            "Run finished in {:.2}s: {} publishes acknowledged, {} messages received",
            statistics.elapsed().as_secs_f64(),
            statistics.get(Category::Publish).done,
            statistics.get(Category::Message).done
        );
        Ok(statistics)
    }
}

/// Wait for every actor; returns (finished, failed-to-connect) counts
async fn settle(handles: Vec<JoinHandle<ActorState>>) -> (usize, usize) {
    let mut finished = 0;
    let mut failed = 0;
    for result in join_all(handles).await {
        match result {
            Ok(ActorState::Finished) => finished += 1,
            Ok(_) => failed += 1,
            Err(e) => {
                log::error!("Client task aborted: {}", e);
                failed += 1;
            }
        }
    }
    (finished, failed)
}
