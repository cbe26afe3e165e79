//! Report Module
//!
//! Turns drained [`Statistics`] into the final per-phase report. Everything
//! is computed on demand from the raw latency samples.

use serde::Serialize;
use std::fmt;

use crate::tracker::{Category, CategoryStats, Statistics};

/// Latency distribution in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencySummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl LatencySummary {
    /// Summarise a sample set; `None` when it is empty
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);

        Some(Self {
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean: sorted.iter().sum::<f64>() / sorted.len() as f64,
            median: quantile(&sorted, 0.50),
            p90: quantile(&sorted, 0.90),
            p95: quantile(&sorted, 0.95),
            p99: quantile(&sorted, 0.99),
        })
    }
}

/// Empirical quantile of ascending `sorted` samples, linearly interpolated
/// between the closest ranks (`h = (n - 1) * p`).
pub fn quantile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let h = (n - 1) as f64 * p.clamp(0.0, 1.0);
            let lo = h.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
        }
    }
}

/// Completed operations divided by the summed latency in seconds.
///
/// This approximates inverse mean latency scaled by the completed count; it
/// is not a wall-clock rate. `None` when the latencies sum to zero.
pub fn per_second(samples_ms: &[f64], completed: u64) -> Option<f64> {
    let seconds = samples_ms.iter().sum::<f64>() / 1000.0;
    if seconds > 0.0 {
        Some(completed as f64 / seconds)
    } else {
        None
    }
}

/// Report for connections, subscribes or publishes
#[derive(Debug, Clone, Serialize)]
pub struct SectionReport {
    pub samples: u64,
    pub errors: u64,
    pub error_pct: f64,
    pub per_sec: Option<f64>,
    pub latency: Option<LatencySummary>,
}

impl SectionReport {
    fn from_stats(stats: &CategoryStats) -> Self {
        let error_pct = if stats.total > 0 {
            stats.failed as f64 / stats.total as f64 * 100.0
        } else {
            0.0
        };
        Self {
            samples: stats.total,
            errors: stats.failed,
            error_pct,
            per_sec: per_second(&stats.samples_ms, stats.done),
            latency: LatencySummary::from_samples(&stats.samples_ms),
        }
    }
}

/// End-to-end delivery report
#[derive(Debug, Clone, Serialize)]
pub struct MessageReport {
    pub received: u64,
    /// Publishes acknowledged minus messages received; negative under duplicate delivery
    pub lost: i64,
    pub lost_pct: Option<f64>,
    /// Arrivals whose envelope could not be decoded or failed the clock sanity check
    pub malformed: u64,
    pub per_sec: Option<f64>,
    pub latency: Option<LatencySummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub connections: SectionReport,
    pub subscribes: SectionReport,
    pub publishes: SectionReport,
    pub messages: MessageReport,
}

impl Report {
    pub fn from_statistics(stats: &Statistics) -> Self {
        let published = stats.get(Category::Publish).done;
        let message = stats.get(Category::Message);
        let lost = published as i64 - message.done as i64;
        let lost_pct = (published > 0).then(|| lost as f64 / published as f64 * 100.0);

        Self {
            connections: SectionReport::from_stats(stats.get(Category::Connection)),
            subscribes: SectionReport::from_stats(stats.get(Category::Subscribe)),
            publishes: SectionReport::from_stats(stats.get(Category::Publish)),
            messages: MessageReport {
                received: message.done,
                lost,
                lost_pct,
                malformed: message.failed,
                per_sec: per_second(&message.samples_ms, message.done),
                latency: LatencySummary::from_samples(&message.samples_ms),
            },
        }
    }
}

fn write_header(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    writeln!(f, " =================== [{}] =================== ", name)
}

fn write_rate_and_latency(
    f: &mut fmt::Formatter<'_>,
    per_sec: Option<f64>,
    latency: Option<&LatencySummary>,
) -> fmt::Result {
    if let Some(per_sec) = per_sec {
        writeln!(f, "  PerSec    = {:.4}", per_sec)?;
    }
    if let Some(l) = latency {
        writeln!(f, "  Min       = {:.4}", l.min)?;
        writeln!(f, "  Max       = {:.4}", l.max)?;
        writeln!(f, "  Average   = {:.4}", l.mean)?;
        writeln!(f, "  Median    = {:.4}", l.median)?;
        writeln!(f, "  Line90    = {:.4}", l.p90)?;
        writeln!(f, "  Line95    = {:.4}", l.p95)?;
        writeln!(f, "  Line99    = {:.4}", l.p99)?;
    }
    Ok(())
}

fn write_section(f: &mut fmt::Formatter<'_>, name: &str, section: &SectionReport) -> fmt::Result {
    write_header(f, name)?;
    writeln!(f, "  Samples   = {}", section.samples)?;
    if section.samples == 0 {
        return Ok(());
    }
    writeln!(f, "  Error     = {}", section.errors)?;
    writeln!(f, "  ErrorPct  = {:.4}%", section.error_pct)?;
    write_rate_and_latency(f, section.per_sec, section.latency.as_ref())
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_section(f, "Client Connections", &self.connections)?;
        write_section(f, "Topic subscribes", &self.subscribes)?;
        write_section(f, "Message publishes", &self.publishes)?;

        let m = &self.messages;
        write_header(f, "Message latency")?;
        writeln!(f, "  Received  = {}", m.received)?;
        writeln!(f, "  Lost      = {}", m.lost)?;
        if let Some(lost_pct) = m.lost_pct {
            writeln!(f, "  LostPct   = {:.4}%", lost_pct)?;
        }
        if m.malformed > 0 {
            writeln!(f, "  Malformed = {}", m.malformed)?;
        }
        write_rate_and_latency(f, m.per_sec, m.latency.as_ref())
    }
}
