//! Prediction results, ledger records and health reports

use crate::models::backend::BackendKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::patient::FeatureVector;

/// Risk tier surfaced alongside a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Determine risk level from probability and thresholds (strictly greater)
    pub fn from_probability(probability: f64, thresholds: &RiskLevelThresholds) -> Self {
        if probability > thresholds.high {
            RiskLevel::High
        } else if probability > thresholds.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Configurable risk tier boundaries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLevelThresholds {
    pub medium: f64,
    pub high: f64,
}

impl Default for RiskLevelThresholds {
    fn default() -> Self {
        Self {
            medium: 0.3,
            high: 0.7,
        }
    }
}

/// Reply to a predict request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    /// 1 when probability exceeds the decision threshold
    pub prediction: u8,
    /// Class-1 probability in [0, 1]
    pub probability: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskLevel>,
}

/// One successfully scored prediction kept by the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub timestamp: DateTime<Utc>,
    pub features: FeatureVector,
    pub prediction: u8,
    pub probability: f64,
}

impl PredictionRecord {
    /// Record stamped with the current time
    pub fn new(features: FeatureVector, prediction: u8, probability: f64) -> Self {
        Self::at(Utc::now(), features, prediction, probability)
    }

    pub fn at(
        timestamp: DateTime<Utc>,
        features: FeatureVector,
        prediction: u8,
        probability: f64,
    ) -> Self {
        Self {
            timestamp,
            features,
            prediction,
            probability,
        }
    }
}

/// Reply to a health request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    /// True only while a trained classifier is active
    pub model_loaded: bool,
    pub backend: BackendKind,
    pub model_version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<DateTime<Utc>>,
}

/// Reply to a successful retrain request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainReport {
    pub accuracy: f64,
    pub rows_processed: usize,
}
