//! Operational counters and latency statistics for the serving process.
//!
//! These are process-health numbers logged periodically; the prediction
//! statistics callers ask for live in [`crate::ledger`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::info;

const LATENCY_WINDOW: usize = 10_000;

/// Counters for every request outcome
pub struct ServiceMetrics {
    pub predictions_served: AtomicU64,
    pub predictions_rejected: AtomicU64,
    pub inference_failures: AtomicU64,
    pub retrains_succeeded: AtomicU64,
    pub retrains_failed: AtomicU64,
    /// Recent predict latencies (in microseconds)
    latencies: Mutex<VecDeque<u64>>,
    start_time: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            predictions_served: AtomicU64::new(0),
            predictions_rejected: AtomicU64::new(0),
            inference_failures: AtomicU64::new(0),
            retrains_succeeded: AtomicU64::new(0),
            retrains_failed: AtomicU64::new(0),
            latencies: Mutex::new(VecDeque::with_capacity(1000)),
            start_time: Instant::now(),
        }
    }

    /// Record a successfully scored prediction
    pub fn record_prediction(&self, elapsed: Duration) {
        self.predictions_served.fetch_add(1, Ordering::Relaxed);

        let mut latencies = self.latencies.lock().unwrap_or_else(|e| e.into_inner());
        if latencies.len() == LATENCY_WINDOW {
            latencies.pop_front();
        }
        latencies.push_back(elapsed.as_micros() as u64);
    }

    pub fn record_rejection(&self) {
        self.predictions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inference_failure(&self) {
        self.inference_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retrain(&self, succeeded: bool) {
        let counter = if succeeded {
            &self.retrains_succeeded
        } else {
            &self.retrains_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Latency statistics over the recent window
    pub fn get_latency_stats(&self) -> LatencyStats {
        let mut sorted: Vec<u64> = {
            let latencies = self.latencies.lock().unwrap_or_else(|e| e.into_inner());
            latencies.iter().copied().collect()
        };
        if sorted.is_empty() {
            return LatencyStats::default();
        }
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: at(0.50),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Predictions per second since start
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.predictions_served.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Log a one-shot summary
    pub fn print_summary(&self) {
        let latency = self.get_latency_stats();
        info!(
            served = self.predictions_served.load(Ordering::Relaxed),
            rejected = self.predictions_rejected.load(Ordering::Relaxed),
            failed = self.inference_failures.load(Ordering::Relaxed),
            retrains_ok = self.retrains_succeeded.load(Ordering::Relaxed),
            retrains_failed = self.retrains_failed.load(Ordering::Relaxed),
            throughput = format!("{:.1} req/s", self.get_throughput()),
            mean_us = latency.mean_us,
            p95_us = latency.p95_us,
            p99_us = latency.p99_us,
            "Service metrics"
        );
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Predict latency statistics
#[derive(Debug, Default, PartialEq)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Periodic summary logger
pub struct MetricsReporter {
    metrics: Arc<ServiceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServiceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs: interval_secs.max(1),
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // First tick fires immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
