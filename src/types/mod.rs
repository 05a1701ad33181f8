//! Type definitions for the risk service

pub mod dataset;
pub mod patient;
pub mod prediction;

pub use dataset::TrainingDataset;
pub use patient::{FeatureSchema, FeatureVector, FEATURE_COUNT};
pub use prediction::{
    HealthReport, PredictionRecord, PredictionResponse, RetrainReport, RiskLevel,
    RiskLevelThresholds,
};
