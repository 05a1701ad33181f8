//! Configuration management for the risk service

use crate::models::forest::ForestConfig;
use crate::types::prediction::RiskLevelThresholds;
use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub models: ModelsConfig,
    pub detection: DetectionConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub retrain: RetrainConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Request subject for predictions
    pub predict_subject: String,
    /// Request subject for health checks
    pub health_subject: String,
    /// Request subject for ledger metrics
    pub metrics_subject: String,
    /// Request subject for dataset uploads
    pub retrain_subject: String,
}

/// Model artifact locations
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Serialized classifier
    pub artifact_path: String,
    /// Ordered feature-name list written alongside the artifact
    pub schema_path: String,
}

/// Decision rule applied to backend probabilities
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Probability strictly above this is a positive prediction
    pub threshold: f64,
    /// Whether replies carry a risk tier
    #[serde(default = "default_include_risk")]
    pub include_risk: bool,
    /// Risk tier boundaries
    #[serde(default)]
    pub risk_levels: RiskLevelThresholds,
}

fn default_include_risk() -> bool {
    true
}

/// Prediction ledger configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Maximum retained predictions
    pub capacity: usize,
    /// Minimum records before aggregates are reported
    pub min_records_for_metrics: usize,
    /// Recent-activity window in hours
    pub window_hours: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            min_records_for_metrics: 10,
            window_hours: 24,
        }
    }
}

/// Retrain configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetrainConfig {
    /// Held-out share of rows used for the advisory accuracy
    pub test_fraction: f64,
    /// Seed for the split and the forest
    pub seed: u64,
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub balanced_class_weight: bool,
}

impl RetrainConfig {
    /// Forest hyperparameters derived from this section
    pub fn forest(&self) -> ForestConfig {
        ForestConfig {
            n_estimators: self.n_estimators,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            max_features: None,
            balanced_class_weight: self.balanced_class_weight,
            seed: self.seed,
        }
    }
}

impl Default for RetrainConfig {
    fn default() -> Self {
        let forest = ForestConfig::default();
        Self {
            test_fraction: 0.2,
            seed: forest.seed,
            n_estimators: forest.n_estimators,
            max_depth: forest.max_depth,
            min_samples_split: forest.min_samples_split,
            balanced_class_weight: forest.balanced_class_weight,
        }
    }
}

/// Request processing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum concurrently processed requests
    pub workers: usize,
    /// Seconds between operational metric summaries
    pub report_interval_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                predict_subject: "diabetes.predict".to_string(),
                health_subject: "diabetes.health".to_string(),
                metrics_subject: "diabetes.metrics".to_string(),
                retrain_subject: "diabetes.retrain".to_string(),
            },
            models: ModelsConfig {
                artifact_path: "models/model.json".to_string(),
                schema_path: "models/features.json".to_string(),
            },
            detection: DetectionConfig {
                threshold: 0.5,
                include_risk: true,
                risk_levels: RiskLevelThresholds::default(),
            },
            ledger: LedgerConfig::default(),
            retrain: RetrainConfig::default(),
            pipeline: PipelineConfig {
                workers: 4,
                report_interval_secs: 60,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
