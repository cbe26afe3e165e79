//! Configuration Module Tests
//!
//! Unit tests and property-based tests for the config module.
//!
//! Property tests validate:
//! - Property 7: Configuration Round-Trip Consistency
//! - Property 8: Configuration Default Values
//! - Property 9: Client Split

use clap::Parser;
use mqtt_bench::adapter::QoS;
use mqtt_bench::config::{CliArgs, ConfigError};
use mqtt_bench::Config;
use proptest::prelude::*;
use std::path::PathBuf;

#[test]
fn test_default_config_values() {
    let config = Config::default();

    assert_eq!(config.broker, "localhost:1883");
    assert_eq!(config.username, "bench");
    assert_eq!(config.password, "cGFzc3dvcmQK");
    assert_eq!(config.topic, "bench-topic");
    assert_eq!(config.qos, QoS::AtLeastOnce);
    assert_eq!(config.payload_size, 256);
    assert_eq!(config.message_count, 1);
    assert_eq!(config.client_count, 100);
    assert!(!config.quiet);
    assert_eq!(config.interval_ms, 500);
    assert_eq!(config.wait_rounds, 5);
    assert!(!config.json);
    assert!(config.histogram_dir.is_none());
}

#[test]
fn test_cli_flags_override_defaults() {
    let args = CliArgs::try_parse_from([
        "mqtt-bench", "-b", "broker:1884", "-u", "load", "-p", "pw", "-t", "perf", "-x", "2", "-s", "64",
        "-m", "3", "-c", "10", "-q", "-i", "25", "-w", "7", "--json", "--hlog-dir", "out",
    ])
    .unwrap();
    let config = args.into_config().unwrap();

    assert_eq!(config.broker, "broker:1884");
    assert_eq!(config.username, "load");
    assert_eq!(config.password, "pw");
    assert_eq!(config.topic, "perf");
    assert_eq!(config.qos, QoS::ExactlyOnce);
    assert_eq!(config.payload_size, 64);
    assert_eq!(config.message_count, 3);
    assert_eq!(config.client_count, 10);
    assert!(config.quiet);
    assert_eq!(config.interval_ms, 25);
    assert_eq!(config.wait_rounds, 7);
    assert!(config.json);
    assert_eq!(config.histogram_dir, Some(PathBuf::from("out")));
}

#[test]
fn test_cli_without_flags_is_default() {
    let config = CliArgs::try_parse_from(["mqtt-bench"]).unwrap().into_config().unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_cli_negative_interval_resets() {
    let args = CliArgs::try_parse_from(["mqtt-bench", "-i", "-1"]).unwrap();
    let mut config = args.into_config().unwrap();
    assert_eq!(config.interval_ms, -1);
    config.validate().unwrap();
    assert_eq!(config.interval_ms, 500);
}

#[test]
fn test_cli_invalid_qos() {
    let args = CliArgs::try_parse_from(["mqtt-bench", "-x", "5"]).unwrap();
    assert!(matches!(args.into_config(), Err(ConfigError::InvalidQos(5))));
}

#[test]
fn test_cli_overrides_properties_file() {
    let path = std::env::temp_dir().join(format!("mqtt_bench_config_{}.properties", std::process::id()));
    std::fs::write(&path, "BROKER=file-broker:1883\nCLIENT_COUNT=6\nTOPIC=from-file\n").unwrap();

    let path_arg = path.to_string_lossy().to_string();
    let args = CliArgs::try_parse_from(["mqtt-bench", "--config", path_arg.as_str(), "-c", "12"]).unwrap();
    let config = args.into_config().unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(config.broker, "file-broker:1883");
    assert_eq!(config.topic, "from-file");
    assert_eq!(config.client_count, 12);
}

#[test]
fn test_quiet_properties_file_quiets_logging() {
    let path = std::env::temp_dir().join(format!("mqtt_bench_quiet_{}.properties", std::process::id()));
    std::fs::write(&path, "QUIET=true\n").unwrap();

    let path_arg = path.to_string_lossy().to_string();
    let args = CliArgs::try_parse_from(["mqtt-bench", "--config", path_arg.as_str()]).unwrap();
    assert!(!args.quiet);
    let config = args.into_config().unwrap();
    let _ = std::fs::remove_file(&path);

    assert!(config.quiet);
    assert_eq!(config.log_filter(), "warn");
}

#[test]
fn test_missing_config_file() {
    let args = CliArgs::try_parse_from(["mqtt-bench", "--config", "/nonexistent/mqtt-bench.properties"]).unwrap();
    assert!(matches!(args.into_config(), Err(ConfigError::IoError(_))));
}

// ============================================================================
// Property-Based Tests
// ============================================================================

fn hostname_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,10}(\\.[a-z][a-z0-9]{0,5}){0,2}:[1-9][0-9]{0,3}"
}

proptest! {
    /// Property 8: Configuration Default Values
    ///
    /// *For any* partial .properties config, parsing SHALL produce a Config where
    /// missing fields have their defined default values and present fields retain
    /// their specified values.
    #[test]
    fn prop_config_defaults_preserved(
        message_count in 1usize..10000,
        client_count in 2usize..10000
    ) {
        let content = format!("MESSAGE_COUNT={}\nCLIENT_COUNT={}\n", message_count, client_count);
        let config = Config::from_properties_str(&content).unwrap();

        prop_assert_eq!(config.message_count, message_count);
        prop_assert_eq!(config.client_count, client_count);

        // Missing fields have default values
        prop_assert_eq!(config.broker, "localhost:1883");
        prop_assert_eq!(config.qos, QoS::AtLeastOnce);
        prop_assert_eq!(config.payload_size, 256);
        prop_assert!(!config.quiet);
    }

    /// Property 7: Configuration Round-Trip Consistency
    ///
    /// *For any* valid Config written as .properties, parsing SHALL preserve
    /// all specified field values, and the result SHALL validate.
    #[test]
    fn prop_config_round_trip(
        broker in hostname_strategy(),
        qos in 0u8..=2,
        payload_size in 8usize..100000,
        client_count in 2usize..10000,
        interval_ms in 0i64..10000,
        quiet in any::<bool>()
    ) {
        let content = format!(
            "BROKER={}\nQOS={}\nPAYLOAD_SIZE={}\nCLIENT_COUNT={}\nINTERVAL_MS={}\nQUIET={}\n",
            broker, qos, payload_size, client_count, interval_ms, quiet
        );

        let mut config = Config::from_properties_str(&content).unwrap();

        prop_assert_eq!(&config.broker, &broker);
        prop_assert_eq!(config.qos.level(), qos);
        prop_assert_eq!(config.payload_size, payload_size);
        prop_assert_eq!(config.client_count, client_count);
        prop_assert_eq!(config.interval_ms, interval_ms);
        prop_assert_eq!(config.quiet, quiet);
        prop_assert!(config.validate().is_ok());
    }

    /// Property 9: Client Split
    ///
    /// *For any* client count c >= 2, the run SHALL use floor(c / 2) subscribers
    /// and the same number of publishers.
    #[test]
    fn prop_client_split(client_count in 2usize..100000) {
        let config = Config { client_count, ..Default::default() };
        prop_assert_eq!(config.pairs(), client_count / 2);
        prop_assert!(2 * config.pairs() <= client_count);
    }
}
