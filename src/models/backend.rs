//! Scoring backends
//!
//! A backend turns a positional feature vector into a class-1 probability.
//! The serving path never mutates a backend; a retrain replaces it wholesale.

use crate::error::ServiceError;
use crate::models::loader::ModelArtifact;
use serde::{Deserialize, Serialize};

/// Which backend variant is serving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Trained,
    Heuristic,
}

/// Pluggable scoring strategy
pub trait ScoringBackend: Send + Sync {
    /// Class-1 probability in [0, 1] for a vector in schema order.
    fn predict_probability(&self, features: &[f64]) -> Result<f64, ServiceError>;

    /// Backend variant
    fn kind(&self) -> BackendKind;

    /// Persisted artifact this backend was loaded from, if any
    fn artifact(&self) -> Option<&ModelArtifact> {
        None
    }
}

// Positions in the default schema
const PREGNANCIES: usize = 0;
const GLUCOSE: usize = 1;
const BMI: usize = 5;
const AGE: usize = 7;

/// Deterministic risk score used when no trained artifact is available.
///
/// `glucose/200*0.4 + bmi/50*0.3 + age/100*0.2 + pregnancies/10*0.1`,
/// clamped to [0, 1].
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicFallback;

impl HeuristicFallback {
    const TERMS: [(usize, f64, f64); 4] = [
        (GLUCOSE, 200.0, 0.4),
        (BMI, 50.0, 0.3),
        (AGE, 100.0, 0.2),
        (PREGNANCIES, 10.0, 0.1),
    ];

    pub fn new() -> Self {
        Self
    }

    /// Unclamped weighted score
    pub fn risk_score(&self, features: &[f64]) -> f64 {
        Self::TERMS
            .iter()
            .map(|&(idx, normalizer, weight)| {
                features.get(idx).copied().unwrap_or(0.0) / normalizer * weight
            })
            .sum()
    }
}

impl ScoringBackend for HeuristicFallback {
    fn predict_probability(&self, features: &[f64]) -> Result<f64, ServiceError> {
        // max/min rather than clamp so a NaN collapses to 0 instead of propagating
        Ok(self.risk_score(features).max(0.0).min(1.0))
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Heuristic
    }
}

/// Backend wrapping a fitted classifier read back from its artifact
#[derive(Debug, Clone)]
pub struct TrainedClassifier {
    artifact: ModelArtifact,
}

impl TrainedClassifier {
    pub fn new(artifact: ModelArtifact) -> Self {
        Self { artifact }
    }
}

impl ScoringBackend for TrainedClassifier {
    fn predict_probability(&self, features: &[f64]) -> Result<f64, ServiceError> {
        let probability = self
            .artifact
            .classifier
            .predict_proba(features)
            .map_err(ServiceError::Inference)?;

        if !(0.0..=1.0).contains(&probability) {
            return Err(ServiceError::Inference(format!(
                "classifier returned probability {} outside [0, 1]",
                probability
            )));
        }
        Ok(probability)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Trained
    }

    fn artifact(&self) -> Option<&ModelArtifact> {
        Some(&self.artifact)
    }
}
