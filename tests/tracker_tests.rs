//! Statistics Tracker Module Tests
//!
//! Unit tests and property-based tests for the aggregator and report.
//!
//! Property tests validate:
//! - Property 4: Counter Conservation Under Concurrency
//! - Property 5: Quantile Ordering
//! - Property 6: Loss Accounting

use mqtt_bench::report::{quantile, LatencySummary};
use mqtt_bench::tracker::{Category, Phase};
use mqtt_bench::StatsAggregator;
use proptest::prelude::*;
use std::time::Duration;

const GRACE: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_empty_run_reports_zero() {
    let (sink, handle) = StatsAggregator::spawn();
    drop(sink);
    let stats = handle.finish(GRACE).await.unwrap();

    for category in Category::ALL {
        let c = stats.get(category);
        assert_eq!((c.total, c.done, c.failed), (0, 0, 0));
        assert!(c.samples_ms.is_empty());
    }

    let report = stats.report();
    assert_eq!(report.connections.samples, 0);
    assert!(report.connections.latency.is_none());
    assert_eq!(report.messages.lost, 0);
    assert!(report.messages.lost_pct.is_none());
}

#[tokio::test]
async fn test_elapsed_converted_to_milliseconds() {
    let (sink, handle) = StatsAggregator::spawn();
    for ms in [1u64, 2, 3, 4, 5] {
        sink.begin(Category::Subscribe);
        sink.record(Category::Subscribe, Phase::Done(ms * 1_000_000));
    }
    drop(sink);
    let stats = handle.finish(GRACE).await.unwrap();

    assert_eq!(stats.get(Category::Subscribe).samples_ms, vec![1.0, 2.0, 3.0, 4.0, 5.0]);

    let report = stats.report();
    let latency = report.subscribes.latency.unwrap();
    assert_eq!(latency.min, 1.0);
    assert_eq!(latency.max, 5.0);
    assert_eq!(latency.mean, 3.0);
    assert_eq!(latency.median, 3.0);
    assert!(latency.p90 >= 4.0 && latency.p90 <= 5.0);
    assert!(latency.p95 >= 4.0 && latency.p95 <= 5.0);
    // 5 operations over 15ms of summed latency
    let per_sec = report.subscribes.per_sec.unwrap();
    assert!((per_sec - 5.0 / 0.015).abs() < 1e-6);
}

#[tokio::test]
async fn test_loss_and_malformed_in_report() {
    let (sink, handle) = StatsAggregator::spawn();
    for _ in 0..4 {
        sink.begin(Category::Publish);
        sink.done(Category::Publish, Duration::from_millis(1));
    }
    for _ in 0..3 {
        sink.begin(Category::Message);
        sink.done(Category::Message, Duration::from_millis(2));
    }
    sink.begin(Category::Message);
    sink.failed(Category::Message);
    drop(sink);

    let report = handle.finish(GRACE).await.unwrap().report();
    assert_eq!(report.messages.received, 3);
    assert_eq!(report.messages.lost, 1);
    assert_eq!(report.messages.lost_pct, Some(25.0));
    assert_eq!(report.messages.malformed, 1);

    let text = report.to_string();
    assert!(text.contains("[Message latency]"));
    assert!(text.contains("Lost      = 1"));
    assert!(text.contains("LostPct   = 25.0000%"));
    assert!(text.contains("Malformed = 1"));
}

#[tokio::test]
async fn test_error_percentage() {
    let (sink, handle) = StatsAggregator::spawn();
    for i in 0..4 {
        sink.begin(Category::Connection);
        if i == 0 {
            sink.failed(Category::Connection);
        } else {
            sink.done(Category::Connection, Duration::from_millis(10));
        }
    }
    drop(sink);

    let report = handle.finish(GRACE).await.unwrap().report();
    assert_eq!(report.connections.samples, 4);
    assert_eq!(report.connections.errors, 1);
    assert_eq!(report.connections.error_pct, 25.0);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["connections"]["errors"], 1);
    assert!(json["messages"]["lost_pct"].is_null());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_producers_conserve_counts() {
    let (sink, handle) = StatsAggregator::spawn();
    let mut producers = Vec::new();
    for p in 0..16 {
        let sink = sink.clone();
        producers.push(tokio::spawn(async move {
            for i in 0..100 {
                sink.begin(Category::Publish);
                if (p + i) % 7 == 0 {
                    sink.failed(Category::Publish);
                } else {
                    sink.done(Category::Publish, Duration::from_micros(i as u64 + 1));
                }
            }
        }));
    }
    drop(sink);
    for producer in producers {
        producer.await.unwrap();
    }

    let stats = handle.finish(GRACE).await.unwrap();
    let publish = stats.get(Category::Publish);
    assert_eq!(publish.total, 1600);
    assert_eq!(publish.done + publish.failed, publish.total);
    assert_eq!(publish.samples_ms.len() as u64, publish.done);
    assert_eq!(publish.histogram.len(), publish.done);
}

// ============================================================================
// Property-Based Tests
// ============================================================================

fn outcome_strategy() -> impl Strategy<Value = Vec<(usize, bool)>> {
    proptest::collection::vec((0usize..4, any::<bool>()), 0..200)
}

fn samples_strategy() -> impl Strategy<Value = Vec<f64>> {
    proptest::collection::vec(0.0f64..10_000.0, 1..200)
}

proptest! {
    /// Property 4: Counter Conservation Under Concurrency
    ///
    /// *For any* sequence of begun operations, each completing or failing,
    /// after the queue drains `total` SHALL equal the Begin count and
    /// `done + failed` SHALL equal `total` for every category.
    #[test]
    fn prop_counters_conserved(outcomes in outcome_strategy()) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let stats = runtime.block_on(async {
            let (sink, handle) = StatsAggregator::spawn();
            for (category, ok) in &outcomes {
                let category = Category::ALL[*category];
                sink.begin(category);
                if *ok {
                    sink.done(category, Duration::from_micros(5));
                } else {
                    sink.failed(category);
                }
            }
            drop(sink);
            handle.finish(GRACE).await.unwrap()
        });

        for (index, category) in Category::ALL.iter().enumerate() {
            let begun = outcomes.iter().filter(|(c, _)| *c == index).count() as u64;
            let c = stats.get(*category);
            prop_assert_eq!(c.total, begun);
            prop_assert_eq!(c.done + c.failed, c.total);
        }
    }

    /// Property 5: Quantile Ordering
    ///
    /// *For any* non-empty sample set, min <= median <= p90 <= p95 <= p99 <= max
    /// and min <= mean <= max.
    #[test]
    fn prop_quantiles_ordered(samples in samples_strategy()) {
        let s = LatencySummary::from_samples(&samples).unwrap();
        prop_assert!(s.min <= s.median);
        prop_assert!(s.median <= s.p90);
        prop_assert!(s.p90 <= s.p95);
        prop_assert!(s.p95 <= s.p99);
        prop_assert!(s.p99 <= s.max);
        prop_assert!(s.min <= s.mean + 1e-9 && s.mean <= s.max + 1e-9);
    }

    /// Property 5b: Quantile endpoints equal the extremes
    #[test]
    fn prop_quantile_endpoints(samples in samples_strategy()) {
        let mut sorted = samples.clone();
        sorted.sort_by(f64::total_cmp);
        prop_assert_eq!(quantile(&sorted, 0.0), sorted[0]);
        prop_assert_eq!(quantile(&sorted, 1.0), sorted[sorted.len() - 1]);
    }

    /// Property 6: Loss Accounting
    ///
    /// *For any* counts of acknowledged publishes and received messages,
    /// `lost` SHALL equal their difference.
    #[test]
    fn prop_lost_is_publish_minus_received(published in 0u64..50, received in 0u64..50) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let report = runtime.block_on(async {
            let (sink, handle) = StatsAggregator::spawn();
            for _ in 0..published {
                sink.begin(Category::Publish);
                sink.done(Category::Publish, Duration::from_millis(1));
            }
            for _ in 0..received {
                sink.begin(Category::Message);
                sink.done(Category::Message, Duration::from_millis(1));
            }
            drop(sink);
            handle.finish(GRACE).await.unwrap().report()
        });

        prop_assert_eq!(report.messages.lost, published as i64 - received as i64);
        prop_assert_eq!(report.messages.lost_pct.is_some(), published > 0);
    }
}
