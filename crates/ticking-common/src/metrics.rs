//! Per-section timing statistics for profiling reports.
//!
//! Keeps running totals plus a ring buffer of recent samples for
//! percentiles, so memory stays fixed however long a section runs.

use serde::Serialize;
use std::time::Duration;

use crate::time::duration_nanos;

/// Timing statistics for one named section.
#[derive(Debug, Clone)]
pub struct SectionStats {
    /// Ring buffer of recent durations in nanoseconds.
    samples: Box<[u64]>,
    /// Next write position in the ring buffer.
    write_pos: usize,
    /// Number of valid samples (saturates at buffer size).
    sample_count: usize,
    /// Total number of recordings.
    count: u64,
    min_ns: u64,
    max_ns: u64,
    sum_ns: u64,
}

impl SectionStats {
    /// Create statistics retaining up to `histogram_size` recent samples.
    #[must_use]
    pub fn new(histogram_size: usize) -> Self {
        let size = histogram_size.max(1);
        Self {
            samples: vec![0u64; size].into_boxed_slice(),
            write_pos: 0,
            sample_count: 0,
            count: 0,
            min_ns: u64::MAX,
            max_ns: 0,
            sum_ns: 0,
        }
    }

    /// Record one execution of the section.
    pub fn record(&mut self, duration: Duration) {
        let ns = duration_nanos(duration);

        self.samples[self.write_pos] = ns;
        self.write_pos = (self.write_pos + 1) % self.samples.len();
        self.sample_count = self.sample_count.saturating_add(1).min(self.samples.len());

        self.count += 1;
        self.min_ns = self.min_ns.min(ns);
        self.max_ns = self.max_ns.max(ns);
        self.sum_ns = self.sum_ns.saturating_add(ns);
    }

    /// Number of recordings.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Total time spent in the section.
    #[must_use]
    pub fn total(&self) -> Duration {
        Duration::from_nanos(self.sum_ns)
    }

    /// Shortest recording.
    #[must_use]
    pub fn min(&self) -> Option<Duration> {
        (self.count > 0).then(|| Duration::from_nanos(self.min_ns))
    }

    /// Longest recording.
    #[must_use]
    pub fn max(&self) -> Option<Duration> {
        (self.count > 0).then(|| Duration::from_nanos(self.max_ns))
    }

    /// Mean over all recordings.
    #[must_use]
    pub fn mean(&self) -> Option<Duration> {
        (self.count > 0).then(|| Duration::from_nanos(self.sum_ns / self.count))
    }

    /// Percentile over the retained samples.
    ///
    /// Returns `None` without samples or when `percentile` is outside
    /// 0.0..=100.0.
    #[must_use]
    pub fn percentile(&self, percentile: f64) -> Option<Duration> {
        if self.sample_count == 0 || !(0.0..=100.0).contains(&percentile) {
            return None;
        }

        let mut sorted: Vec<u64> = self.samples[..self.sample_count].to_vec();
        sorted.sort_unstable();

        let idx = ((percentile / 100.0) * (sorted.len() - 1) as f64).round() as usize;
        let idx = idx.min(sorted.len() - 1);

        Some(Duration::from_nanos(sorted[idx]))
    }

    /// Serializable view of the statistics.
    #[must_use]
    pub fn snapshot(&self) -> SectionSnapshot {
        SectionSnapshot {
            count: self.count,
            total_ns: self.sum_ns,
            min_ns: self.min().map(duration_nanos),
            max_ns: self.max().map(duration_nanos),
            mean_ns: self.mean().map(duration_nanos),
            p50_ns: self.percentile(50.0).map(duration_nanos),
            p99_ns: self.percentile(99.0).map(duration_nanos),
        }
    }
}

/// Immutable snapshot of a section's statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SectionSnapshot {
    /// Number of recordings.
    pub count: u64,
    /// Total time spent in the section, in nanoseconds.
    pub total_ns: u64,
    /// Shortest recording.
    pub min_ns: Option<u64>,
    /// Longest recording.
    pub max_ns: Option<u64>,
    /// Mean over all recordings.
    pub mean_ns: Option<u64>,
    /// Median of the retained samples.
    pub p50_ns: Option<u64>,
    /// 99th percentile of the retained samples.
    pub p99_ns: Option<u64>,
}
