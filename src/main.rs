//! MQTT Bench Main Entry Point
//!
//! Drives a publish/subscribe load test against an MQTT broker and prints
//! the per-phase report.

use clap::Parser;
use mqtt_bench::adapter::MqttConnector;
use mqtt_bench::config::CliArgs;
use mqtt_bench::Bench;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    let config_file = args.config.clone();
    let resolved = args.into_config().and_then(|mut c| c.validate().map(|_| c));

    // RUST_LOG still overrides the filter picked from the resolved config
    let default_filter = resolved.as_ref().map(|c| c.log_filter()).unwrap_or("info");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();

    let mut config = match resolved {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configurations: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(path) = config_file {
        log::info!("Loaded configuration from {}", path.display());
    }
    config.log_config();

    log::info!("Starting ...");
    let statistics = match Bench::new(config.clone(), MqttConnector::default()).run().await {
        Ok(statistics) => statistics,
        Err(e) => {
            log::error!("Benchmark error: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(dir) = config.histogram_dir.take() {
        statistics.save_histograms(&dir);
    }

    let report = statistics.report();
    if config.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                log::error!("Failed to serialize report: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        print!("\n\n{}", report);
    }
}
