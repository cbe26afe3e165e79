//! Statistics Tracker Module
//!
//! Aggregates outcome events from every client actor. Producers hold a
//! cloneable [`StatsSink`]; a single consuming task owns the per-category
//! counters, latency samples and HdrHistograms, so the hot path needs no
//! locks. The `done`/`failed` counters are mirrored into atomics that the
//! completion monitor may read while the run is in progress.

use hdrhistogram::serialization::interval_log::IntervalLogWriterBuilder;
use hdrhistogram::serialization::V2DeflateSerializer;
use hdrhistogram::Histogram;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::report::Report;

/// Upper histogram bound: 1 hour in nanoseconds
const HISTOGRAM_MAX_NS: u64 = 3_600_000_000_000;

/// Event category, one per measured phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Category {
    Connection,
    Subscribe,
    Publish,
    Message,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Connection,
        Category::Subscribe,
        Category::Publish,
        Category::Message,
    ];

    fn index(self) -> usize {
        match self {
            Category::Connection => 0,
            Category::Subscribe => 1,
            Category::Publish => 2,
            Category::Message => 3,
        }
    }

    /// Tag used for this category in histogram logs
    pub fn tag(self) -> &'static str {
        match self {
            Category::Connection => "connect",
            Category::Subscribe => "subscribe",
            Category::Publish => "publish",
            Category::Message => "message",
        }
    }
}

/// Outcome of one step of one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Begin,
    /// Completed; carries the elapsed time in nanoseconds
    Done(u64),
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsEvent {
    pub category: Category,
    pub phase: Phase,
}

#[derive(Debug, Default)]
struct Counters {
    done: AtomicU64,
    failed: AtomicU64,
}

/// Race-free view of the progress counters
#[derive(Debug, Clone, Default)]
pub struct Progress {
    counters: Arc<[Counters; 4]>,
}

impl Progress {
    pub fn done(&self, category: Category) -> u64 {
        self.counters[category.index()].done.load(Ordering::Acquire)
    }

    pub fn failed(&self, category: Category) -> u64 {
        self.counters[category.index()].failed.load(Ordering::Acquire)
    }

    pub(crate) fn add_done(&self, category: Category) {
        self.counters[category.index()].done.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn add_failed(&self, category: Category) {
        self.counters[category.index()].failed.fetch_add(1, Ordering::Release);
    }
}

/// Producer side of the statistics funnel
#[derive(Debug, Clone)]
pub struct StatsSink {
    tx: mpsc::UnboundedSender<StatsEvent>,
}

impl StatsSink {
    pub fn record(&self, category: Category, phase: Phase) {
        if self.tx.send(StatsEvent { category, phase }).is_err() {
            log::debug!("Statistics closed, dropping {:?} {:?}", category, phase);
        }
    }

    pub fn begin(&self, category: Category) {
        self.record(category, Phase::Begin);
    }

    pub fn done(&self, category: Category, elapsed: Duration) {
        self.record(category, Phase::Done(elapsed.as_nanos() as u64));
    }

    pub fn failed(&self, category: Category) {
        self.record(category, Phase::Failed);
    }
}

/// Final aggregate for one category
#[derive(Debug, Clone)]
pub struct CategoryStats {
    pub total: u64,
    pub done: u64,
    pub failed: u64,
    /// Completed-operation latencies in milliseconds, in arrival order
    pub samples_ms: Vec<f64>,
    /// Same latencies in nanoseconds
    pub histogram: Histogram<u64>,
}

impl Default for CategoryStats {
    fn default() -> Self {
        Self {
            total: 0,
            done: 0,
            failed: 0,
            samples_ms: Vec::new(),
            histogram: Histogram::new_with_bounds(1, HISTOGRAM_MAX_NS, 3)
                .expect("histogram bounds are valid"),
        }
    }
}

impl CategoryStats {
    fn apply(&mut self, phase: Phase) {
        match phase {
            Phase::Begin => self.total += 1,
            Phase::Done(elapsed_ns) => {
                self.done += 1;
                self.samples_ms.push(elapsed_ns as f64 / 1_000_000.0);
                let clamped = elapsed_ns.clamp(1, HISTOGRAM_MAX_NS);
                if let Err(e) = self.histogram.record(clamped) {
                    log::warn!("Failed to record latency {}: {}", elapsed_ns, e);
                }
            }
            Phase::Failed => self.failed += 1,
        }
    }
}

/// Snapshot produced once the aggregator has drained
#[derive(Debug, Clone)]
pub struct Statistics {
    categories: [CategoryStats; 4],
    started: SystemTime,
    elapsed: Duration,
}

impl Statistics {
    pub fn get(&self, category: Category) -> &CategoryStats {
        &self.categories[category.index()]
    }

    /// Wall-clock span covered by the aggregator
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn report(&self) -> Report {
        Report::from_statistics(self)
    }

    /// Append every category's histogram to `<dir>/histogram_mqtt_bench.hlog`.
    ///
    /// Failures are logged; returns the log path on success.
    pub fn save_histograms(&self, dir: &Path) -> Option<PathBuf> {
        if let Err(e) = fs::create_dir_all(dir) {
            log::error!("Failed to create histogram log directory '{}': {}", dir.display(), e);
            return None;
        }

        let path = dir.join("histogram_mqtt_bench.hlog");
        let mut file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(f) => f,
            Err(e) => {
                log::error!("Failed to open histogram log file '{}': {}", path.display(), e);
                return None;
            }
        };

        let mut serializer = V2DeflateSerializer::new();
        let mut builder = IntervalLogWriterBuilder::new();
        builder
            .add_comment("[Logged with mqtt-bench 0.1.0]")
            .with_base_time(self.started)
            .with_start_time(self.started);

        let mut log_writer = match builder.begin_log_with(&mut file, &mut serializer) {
            Ok(w) => w,
            Err(e) => {
                log::error!("Failed to create interval log writer: {}", e);
                return None;
            }
        };

        for category in Category::ALL {
            let histogram = &self.get(category).histogram;
            if let Err(e) = log_writer.write_histogram(
                histogram,
                Duration::ZERO,
                self.elapsed,
                hdrhistogram::serialization::interval_log::Tag::new(category.tag()),
            ) {
                log::error!("Failed to write {} histogram to log: {}", category.tag(), e);
                return None;
            }
        }

        log::info!("Histograms saved to {}", path.display());
        Some(path)
    }
}

/// Consumer side of the statistics funnel
pub struct StatsAggregator {
    categories: [CategoryStats; 4],
    progress: Progress,
    started: SystemTime,
    clock: Instant,
}

impl StatsAggregator {
    /// Start the consuming task.
    ///
    /// The queue closes when the last [`StatsSink`] clone is dropped; the task
    /// then drains what is buffered and hands back the [`Statistics`].
    pub fn spawn() -> (StatsSink, AggregatorHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let progress = Progress::default();
        let stop = Arc::new(Notify::new());

        let aggregator = StatsAggregator {
            categories: Default::default(),
            progress: progress.clone(),
            started: SystemTime::now(),
            clock: Instant::now(),
        };
        let task = tokio::spawn(aggregator.run(rx, stop.clone()));

        (StatsSink { tx }, AggregatorHandle { progress, stop, task })
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<StatsEvent>, stop: Arc<Notify>) -> Statistics {
        loop {
            tokio::select! {
                biased;
                event = rx.recv() => match event {
                    Some(event) => self.apply(event),
                    None => break,
                },
                _ = stop.notified() => {
                    // Refuse further sends, keep what is already queued.
                    rx.close();
                    while let Some(event) = rx.recv().await {
                        self.apply(event);
                    }
                    break;
                }
            }
        }

        Statistics {
            categories: self.categories,
            started: self.started,
            elapsed: self.clock.elapsed(),
        }
    }

    fn apply(&mut self, event: StatsEvent) {
        self.categories[event.category.index()].apply(event.phase);
        // Mirror after the sample is stored so readers never see a done count
        // ahead of its latency.
        match event.phase {
            Phase::Begin => {}
            Phase::Done(_) => self.progress.add_done(event.category),
            Phase::Failed => self.progress.add_failed(event.category),
        }
    }
}

/// Owner handle for a running aggregator
pub struct AggregatorHandle {
    progress: Progress,
    stop: Arc<Notify>,
    task: JoinHandle<Statistics>,
}

impl AggregatorHandle {
    pub fn progress(&self) -> Progress {
        self.progress.clone()
    }

    /// Wait for every producer to hang up, then return the drained statistics.
    ///
    /// If sinks are still alive after `grace`, the queue is closed from the
    /// consuming side instead; later sends are discarded.
    pub async fn finish(mut self, grace: Duration) -> Result<Statistics, tokio::task::JoinError> {
        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!("Statistics producers still active after {:?}, closing queue", grace);
                self.stop.notify_one();
                self.task.await
            }
        }
    }
}
