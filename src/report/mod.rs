//! Streaming interval statistics: one [`ReportData`] per measured stream.
//!
//! Each instance has exactly one producer (its worker thread) and one
//! consumer (the live reporter). Count and min/max are relaxed atomics; the
//! quantile estimator and the sparse bucket histogram sit behind a short
//! critical section on the producer's write path.

pub mod live;
pub mod table;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use hdrhistogram::Histogram;
use parking_lot::Mutex;

/// Largest interval the quantile estimator resolves exactly; observations
/// beyond it saturate into the top bucket. One hour covers any plausible
/// stall on a live host.
const MAX_TRACKABLE_NS: u64 = 3_600_000_000_000;

/// Quantile resolution: three significant figures keeps relative error
/// under 0.1% at a fixed memory footprint, independent of sample count.
const SIGNIFICANT_FIGURES: u8 = 3;

struct Estimator {
    quantiles: Histogram<u64>,
    buckets: BTreeMap<u64, u64>,
}

/// Observable summary of one interval stream.
pub struct ReportData {
    bucket_width_ns: u64,
    count: AtomicU64,
    min_ns: AtomicU64,
    max_ns: AtomicU64,
    estimator: Mutex<Estimator>,
}

/// Point-in-time view of a [`ReportData`], consistent within itself.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub count: u64,
    pub min_ns: u64,
    pub max_ns: u64,
    pub mean_ns: f64,
    pub p50_ns: u64,
    pub p90_ns: u64,
    pub p99_ns: u64,
    /// Sparse histogram: bucket index -> occurrences, where an observation
    /// lands in bucket `floor(ns / bucket_width_ns)`.
    pub buckets: Vec<(u64, u64)>,
}

impl ReportData {
    /// Create a stream summary with the given histogram granularity.
    /// `bucket_width_ns` must be positive before any worker starts.
    pub fn new(bucket_width_ns: u64) -> Self {
        assert!(bucket_width_ns > 0, "bucket width must be positive");
        let quantiles = Histogram::new_with_bounds(1, MAX_TRACKABLE_NS, SIGNIFICANT_FIGURES)
            .expect("histogram bounds are constant and valid");
        Self {
            bucket_width_ns,
            count: AtomicU64::new(0),
            min_ns: AtomicU64::new(u64::MAX),
            max_ns: AtomicU64::new(0),
            estimator: Mutex::new(Estimator {
                quantiles,
                buckets: BTreeMap::new(),
            }),
        }
    }

    /// Histogram granularity this stream was created with.
    pub fn bucket_width_ns(&self) -> u64 {
        self.bucket_width_ns
    }

    /// Record one observation. O(1); called from the producer only.
    pub fn record(&self, observation_ns: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.min_ns.fetch_min(observation_ns, Ordering::Relaxed);
        self.max_ns.fetch_max(observation_ns, Ordering::Relaxed);

        let mut estimator = self.estimator.lock();
        estimator.quantiles.saturating_record(observation_ns);
        *estimator
            .buckets
            .entry(observation_ns / self.bucket_width_ns)
            .or_insert(0) += 1;
    }

    /// Sample count so far.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Produce a consistent snapshot for rendering.
    pub fn snapshot(&self) -> Snapshot {
        let estimator = self.estimator.lock();
        let count = estimator.quantiles.len();
        if count == 0 {
            return Snapshot::default();
        }

        let max_ns = self.max_ns.load(Ordering::Relaxed);
        // The estimator reports the highest equivalent value within its
        // resolution, which can overshoot the true extreme; clamp so
        // p50 <= p90 <= p99 <= max always holds in rendered output.
        let quantile = |q: f64| estimator.quantiles.value_at_quantile(q).min(max_ns);

        Snapshot {
            count,
            min_ns: self.min_ns.load(Ordering::Relaxed),
            max_ns,
            mean_ns: estimator.quantiles.mean(),
            p50_ns: quantile(0.50),
            p90_ns: quantile(0.90),
            p99_ns: quantile(0.99),
            buckets: estimator
                .buckets
                .iter()
                .map(|(&index, &count)| (index, count))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot_is_zeroed() {
        let data = ReportData::new(1_000);
        let snap = data.snapshot();
        assert_eq!(snap.count, 0);
        assert_eq!(snap.p99_ns, 0);
        assert!(snap.buckets.is_empty());
    }

    #[test]
    fn test_quantiles_are_monotone() {
        let data = ReportData::new(1_000);
        // A skewed stream: mostly fast, occasional stalls.
        for i in 0..10_000u64 {
            data.record(1_000 + i % 97);
        }
        for _ in 0..100 {
            data.record(250_000);
        }

        let snap = data.snapshot();
        assert!(snap.min_ns <= snap.p50_ns);
        assert!(snap.p50_ns <= snap.p90_ns);
        assert!(snap.p90_ns <= snap.p99_ns);
        assert!(snap.p99_ns <= snap.max_ns);
    }

    #[test]
    fn test_histogram_conservation() {
        let data = ReportData::new(500);
        let samples = [100u64, 499, 500, 999, 1_000, 1_500, 74_321, 74_322];
        for s in samples {
            data.record(s);
        }

        let snap = data.snapshot();
        assert_eq!(snap.count, samples.len() as u64);
        let total: u64 = snap.buckets.iter().map(|(_, c)| c).sum();
        assert_eq!(total, snap.count);
    }

    #[test]
    fn test_bucket_indexing() {
        let data = ReportData::new(1_000);
        data.record(0);
        data.record(999);
        data.record(1_000);
        data.record(2_500);

        let snap = data.snapshot();
        assert_eq!(snap.buckets, vec![(0, 2), (1, 1), (2, 1)]);
    }

    #[test]
    fn test_min_max_track_extremes() {
        let data = ReportData::new(1_000);
        data.record(7_000);
        data.record(3_000);
        data.record(90_000);

        let snap = data.snapshot();
        assert_eq!(snap.min_ns, 3_000);
        assert_eq!(snap.max_ns, 90_000);
        assert_eq!(snap.count, 3);
    }

    #[test]
    fn test_oversized_observation_saturates() {
        let data = ReportData::new(1_000_000);
        data.record(MAX_TRACKABLE_NS + 5);
        let snap = data.snapshot();
        assert_eq!(snap.count, 1);
        assert_eq!(snap.max_ns, MAX_TRACKABLE_NS + 5);
    }
}
