//! MQTT Bench Library
//!
//! A load-generation harness for publish/subscribe brokers. Many concurrent
//! client actors connect, subscribe or publish timestamped messages, and
//! report every outcome to a single statistics aggregator, which produces
//! per-phase latency distributions and end-to-end delivery loss.
//!
//! # Modules
//!
//! - `adapter`: Connection boundary, with rumqttc and in-process loopback implementations
//! - `envelope`: Send timestamp codec for message payloads
//! - `client`: Publisher and subscriber actors
//! - `registry`: Connection funnel for bulk teardown
//! - `tracker`: Outcome event aggregation and histogram export
//! - `report`: Quantiles, throughput and loss figures
//! - `monitor`: Waiting for arrivals to catch up with publishes
//! - `bench`: Phase orchestration
//! - `config`: Properties file and command-line configuration

pub mod adapter;
pub mod bench;
pub mod client;
pub mod config;
pub mod envelope;
pub mod monitor;
pub mod registry;
pub mod report;
pub mod tracker;

// Re-export main types for convenience
pub use bench::Bench;
pub use config::Config;
pub use report::Report;
pub use tracker::{Category, StatsAggregator, Statistics};
