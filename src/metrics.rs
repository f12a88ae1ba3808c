//! Running retrieval metrics.
//!
//! Process-lifetime counters updated after every search call, success or
//! failure. Plain atomics, no locks: updates are append-only increments
//! shared via `Arc` across worker threads, reset only by restart. These
//! are diagnostic, not authoritative.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Atomic counters for search outcomes and latency.
#[derive(Debug, Default)]
pub struct RetrievalMetrics {
    searches: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    cumulative_micros: AtomicU64,
}

/// Point-in-time view with derived statistics.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub searches: u64,
    pub successes: u64,
    pub failures: u64,
    /// Exactly successes/searches; 0.0 before the first search.
    pub success_rate: f64,
    pub mean_latency: Duration,
}

impl RetrievalMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, elapsed: Duration) {
        self.searches.fetch_add(1, Ordering::Relaxed);
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.cumulative_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self, elapsed: Duration) {
        self.searches.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.cumulative_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let searches = self.searches.load(Ordering::Relaxed);
        let successes = self.successes.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        let cumulative = self.cumulative_micros.load(Ordering::Relaxed);

        let success_rate = if searches > 0 {
            successes as f64 / searches as f64
        } else {
            0.0
        };
        let mean_latency = if searches > 0 {
            Duration::from_micros(cumulative / searches)
        } else {
            Duration::ZERO
        };

        MetricsSnapshot {
            searches,
            successes,
            failures,
            success_rate,
            mean_latency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_metrics_report_zero_rate() {
        let metrics = RetrievalMetrics::new();
        let snap = metrics.snapshot();
        assert_eq!(snap.searches, 0);
        assert_eq!(snap.success_rate, 0.0);
        assert_eq!(snap.mean_latency, Duration::ZERO);
    }

    #[test]
    fn test_success_rate_is_exact() {
        let metrics = RetrievalMetrics::new();
        for _ in 0..3 {
            metrics.record_success(Duration::from_millis(10));
        }
        metrics.record_failure(Duration::from_millis(10));

        let snap = metrics.snapshot();
        assert_eq!(snap.searches, 4);
        assert_eq!(snap.successes, 3);
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.success_rate, 0.75);
    }

    #[test]
    fn test_mean_latency_averages_all_calls() {
        let metrics = RetrievalMetrics::new();
        metrics.record_success(Duration::from_millis(10));
        metrics.record_failure(Duration::from_millis(30));

        let snap = metrics.snapshot();
        assert_eq!(snap.mean_latency, Duration::from_millis(20));
    }

    #[test]
    fn test_concurrent_increments_all_land() {
        use std::sync::Arc;

        let metrics = Arc::new(RetrievalMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        m.record_success(Duration::from_micros(5));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let snap = metrics.snapshot();
        assert_eq!(snap.searches, 800);
        assert_eq!(snap.success_rate, 1.0);
    }
}
