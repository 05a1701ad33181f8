//! Bounded prediction history and the metrics derived from it.

use crate::types::prediction::PredictionRecord;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Default number of retained predictions
pub const DEFAULT_CAPACITY: usize = 1000;
/// Fewest records for which aggregate metrics are reported
pub const DEFAULT_MIN_RECORDS: usize = 10;

/// Aggregates over the retained records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerMetrics {
    pub total_predictions: usize,
    pub average_probability: f64,
    pub positive_rate: f64,
    pub predictions_last_24h: usize,
}

/// Reply to a metrics request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LedgerReport {
    Metrics(LedgerMetrics),
    InsufficientData { message: String, count: usize },
}

/// Fixed-capacity FIFO of prediction records
pub struct PredictionLedger {
    records: Mutex<VecDeque<PredictionRecord>>,
    capacity: usize,
    min_records: usize,
    window: Duration,
}

impl PredictionLedger {
    pub fn new(capacity: usize) -> Self {
        Self::with_settings(capacity, DEFAULT_MIN_RECORDS, 24)
    }

    pub fn with_settings(capacity: usize, min_records: usize, window_hours: i64) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            min_records,
            window: Duration::hours(window_hours),
        }
    }

    /// Append a record, evicting the oldest once full
    pub fn append(&self, record: PredictionRecord) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the retained records, oldest first
    pub fn snapshot(&self) -> Vec<PredictionRecord> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.iter().cloned().collect()
    }

    /// Metrics as of now
    pub fn metrics(&self) -> LedgerReport {
        self.metrics_at(Utc::now())
    }

    /// Metrics with the recent-window count measured back from `now`
    pub fn metrics_at(&self, now: DateTime<Utc>) -> LedgerReport {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let count = records.len();

        if count < self.min_records {
            return LedgerReport::InsufficientData {
                message: "Not enough data".to_string(),
                count,
            };
        }

        let cutoff = now - self.window;
        let (probability_sum, positives, recent) =
            records
                .iter()
                .fold((0.0, 0usize, 0usize), |(sum, pos, recent), r| {
                    (
                        sum + r.probability,
                        pos + r.prediction as usize,
                        recent + usize::from(r.timestamp >= cutoff),
                    )
                });

        LedgerReport::Metrics(LedgerMetrics {
            total_predictions: count,
            average_probability: probability_sum / count as f64,
            positive_rate: positives as f64 / count as f64,
            predictions_last_24h: recent,
        })
    }
}

impl Default for PredictionLedger {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
