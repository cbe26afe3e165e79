//! Configuration Module
//!
//! Benchmark settings come from three layers: built-in defaults, an optional
//! Java-style `.properties` file (KEY=VALUE), and command-line flags, each
//! overriding the previous one. `validate` enforces the bounds before any
//! client work starts.

use clap::Parser;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::adapter::QoS;

/// Interval applied when a negative one is configured
pub const DEFAULT_INTERVAL_MS: i64 = 500;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse property '{key}': {reason}")]
    ParseError { key: String, reason: String },

    #[error("empty server address")]
    EmptyBroker,

    #[error("qos must be in range [0, 1, 2], got {0}")]
    InvalidQos(u8),

    #[error("min size of message is 8, got {0}")]
    PayloadTooSmall(usize),

    #[error("at least one message per client is required")]
    NoMessages,

    #[error("at least 2 clients are required, got {0}")]
    TooFewClients(usize),
}

/// Benchmark configuration
///
/// Property names: BROKER, USERNAME, PASSWORD, TOPIC, QOS, PAYLOAD_SIZE,
/// MESSAGE_COUNT, CLIENT_COUNT, QUIET, INTERVAL_MS, WAIT_ROUNDS, HISTOGRAM_DIR
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub broker: String,
    /// Prefix for client ids and usernames
    pub username: String,
    pub password: String,
    /// Base topic; each pair of clients gets `{topic}/{index}`
    pub topic: String,
    pub qos: QoS,
    pub payload_size: usize,
    /// Messages (publisher) or subscriptions (subscriber) per client
    pub message_count: usize,
    /// Total clients, split evenly between subscribers and publishers
    pub client_count: usize,
    pub quiet: bool,
    pub interval_ms: i64,
    /// Completion monitor poll rounds, one second apart
    pub wait_rounds: u32,
    pub json: bool,
    pub histogram_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker: "localhost:1883".into(),
            username: "bench".into(),
            password: "cGFzc3dvcmQK".into(),
            topic: "bench-topic".into(),
            qos: QoS::AtLeastOnce,
            payload_size: 256,
            message_count: 1,
            client_count: 100,
            quiet: false,
            interval_ms: DEFAULT_INTERVAL_MS,
            wait_rounds: 5,
            json: false,
            histogram_dir: None,
        }
    }
}

fn parse_value<T: FromStr>(props: &HashMap<String, String>, key: &str, default: T) -> Result<T, ConfigError> {
    match props.get(key) {
        Some(v) => v.parse().map_err(|_| ConfigError::ParseError {
            key: key.into(),
            reason: format!("invalid {}: {}", std::any::type_name::<T>(), v),
        }),
        None => Ok(default),
    }
}

fn qos_from_level(level: u8) -> Result<QoS, ConfigError> {
    QoS::try_from(level).map_err(ConfigError::InvalidQos)
}

impl Config {
    /// Parse a Java-style .properties file into a HashMap.
    /// Skips blank lines and lines starting with '#'.
    fn parse_properties(content: &str) -> HashMap<String, String> {
        let mut map = HashMap::new();
        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = trimmed.split_once('=') {
                map.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        map
    }

    /// Load configuration from a .properties file (Java KEY=VALUE format).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_properties_str(&content)
    }

    /// Parse config from a properties-format string.
    pub fn from_properties_str(content: &str) -> Result<Self, ConfigError> {
        let props = Self::parse_properties(content);
        let defaults = Config::default();

        Ok(Config {
            broker: props.get("BROKER").cloned().unwrap_or(defaults.broker),
            username: props.get("USERNAME").cloned().unwrap_or(defaults.username),
            password: props.get("PASSWORD").cloned().unwrap_or(defaults.password),
            topic: props.get("TOPIC").cloned().unwrap_or(defaults.topic),
            qos: qos_from_level(parse_value(&props, "QOS", defaults.qos.level())?)?,
            payload_size: parse_value(&props, "PAYLOAD_SIZE", defaults.payload_size)?,
            message_count: parse_value(&props, "MESSAGE_COUNT", defaults.message_count)?,
            client_count: parse_value(&props, "CLIENT_COUNT", defaults.client_count)?,
            quiet: props
                .get("QUIET")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.quiet),
            interval_ms: parse_value(&props, "INTERVAL_MS", defaults.interval_ms)?,
            wait_rounds: parse_value(&props, "WAIT_ROUNDS", defaults.wait_rounds)?,
            json: defaults.json,
            histogram_dir: props.get("HISTOGRAM_DIR").map(PathBuf::from).or(defaults.histogram_dir),
        })
    }

    /// Check bounds and normalise the interval. Must pass before a run starts.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.broker.trim().is_empty() {
            return Err(ConfigError::EmptyBroker);
        }
        if self.payload_size < crate::envelope::HEADER_LEN {
            return Err(ConfigError::PayloadTooSmall(self.payload_size));
        }
        if self.message_count < 1 {
            return Err(ConfigError::NoMessages);
        }
        if self.client_count < 2 {
            return Err(ConfigError::TooFewClients(self.client_count));
        }
        if self.interval_ms < 0 {
            self.interval_ms = DEFAULT_INTERVAL_MS;
        }
        Ok(())
    }

    /// Number of subscribers, which equals the number of publishers
    pub fn pairs(&self) -> usize {
        self.client_count / 2
    }

    /// Pacing delay between iterations and between actor launches
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(0) as u64)
    }

    /// Default log filter; progress is logged at info, so quiet keeps warnings and errors
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            "warn"
        } else {
            "info"
        }
    }

    /// Log all configuration parameters for debugging
    pub fn log_config(&self) {
        log::debug!("Configuration:");
        log::debug!("  broker: {}", self.broker);
        log::debug!("  username: {}", self.username);
        log::debug!("  topic: {}", self.topic);
        log::debug!("  qos: {}", self.qos);
        log::debug!("  payload_size: {}", self.payload_size);
        log::debug!("  message_count: {}", self.message_count);
        log::debug!("  client_count: {}", self.client_count);
        log::debug!("  quiet: {}", self.quiet);
        log::debug!("  interval: {} ms", self.interval_ms);
        log::debug!("  wait_rounds: {}", self.wait_rounds);
        log::debug!("  histogram_dir: {:?}", self.histogram_dir);
    }
}

/// Command-line flags; every flag overrides the file and built-in defaults
#[derive(Debug, Parser)]
#[command(name = "mqtt-bench")]
#[command(about = "Concurrent MQTT publish/subscribe benchmark")]
pub struct CliArgs {
    /// Properties file providing defaults
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Broker address
    #[arg(short = 'b', long)]
    pub broker: Option<String>,

    /// Username prefix
    #[arg(short = 'u', long)]
    pub username: Option<String>,

    /// Password
    #[arg(short = 'p', long)]
    pub password: Option<String>,

    /// Topic prefix
    #[arg(short = 't', long)]
    pub topic: Option<String>,

    /// QoS level
    #[arg(short = 'x', long)]
    pub qos: Option<u8>,

    /// Payload size of message in bytes
    #[arg(short = 's', long = "size")]
    pub payload_size: Option<usize>,

    /// Messages per client
    #[arg(short = 'm', long = "messages")]
    pub message_count: Option<usize>,

    /// Total clients
    #[arg(short = 'c', long = "clients")]
    pub client_count: Option<usize>,

    /// Suppress progress logging
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Interval between operations in milliseconds
    #[arg(short = 'i', long, allow_negative_numbers = true)]
    pub interval: Option<i64>,

    /// Rounds to wait for outstanding messages
    #[arg(short = 'w', long = "wait")]
    pub wait_rounds: Option<u32>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Directory for HdrHistogram interval logs
    #[arg(long)]
    pub hlog_dir: Option<PathBuf>,
}

impl CliArgs {
    /// Resolve the final configuration, without validating it
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(broker) = self.broker {
            config.broker = broker;
        }
        if let Some(username) = self.username {
            config.username = username;
        }
        if let Some(password) = self.password {
            config.password = password;
        }
        if let Some(topic) = self.topic {
            config.topic = topic;
        }
        if let Some(level) = self.qos {
            config.qos = qos_from_level(level)?;
        }
        if let Some(size) = self.payload_size {
            config.payload_size = size;
        }
        if let Some(count) = self.message_count {
            config.message_count = count;
        }
        if let Some(count) = self.client_count {
            config.client_count = count;
        }
        if let Some(interval) = self.interval {
            config.interval_ms = interval;
        }
        if let Some(rounds) = self.wait_rounds {
            config.wait_rounds = rounds;
        }
        if self.hlog_dir.is_some() {
            config.histogram_dir = self.hlog_dir;
        }
        config.quiet |= self.quiet;
        config.json |= self.json;

        Ok(config)
    }
}
