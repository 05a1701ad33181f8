//! Patient feature vector and feature schema

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Number of features every backend consumes
pub const FEATURE_COUNT: usize = 8;

/// Feature names used when no trained artifact supplies its own schema.
pub const DEFAULT_FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "Pregnancies",
    "Glucose",
    "BloodPressure",
    "SkinThickness",
    "Insulin",
    "BMI",
    "DiabetesPedigreeFunction",
    "Age",
];

/// One validated patient record.
///
/// Field order here is the positional order handed to every backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub pregnancies: i64,
    pub glucose: f64,
    pub blood_pressure: f64,
    pub skin_thickness: f64,
    pub insulin: f64,
    pub bmi: f64,
    pub diabetes_pedigree: f64,
    pub age: i64,
}

impl FeatureVector {
    /// Positional view of the record
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.pregnancies as f64,
            self.glucose,
            self.blood_pressure,
            self.skin_thickness,
            self.insulin,
            self.bmi,
            self.diabetes_pedigree,
            self.age as f64,
        ]
    }
}

/// Ordered, unique list of feature names a backend was trained on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSchema(Vec<String>);

impl FeatureSchema {
    /// Build a schema, rejecting empty lists, blank names and duplicates.
    pub fn new(names: Vec<String>) -> Result<Self, String> {
        if names.is_empty() {
            return Err("feature schema is empty".to_string());
        }

        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if name.trim().is_empty() {
                return Err("feature schema contains a blank name".to_string());
            }
            if !seen.insert(name.as_str()) {
                return Err(format!("duplicate feature name '{}'", name));
            }
        }

        Ok(Self(names))
    }

    /// The hardcoded schema bound to the heuristic fallback
    pub fn default_schema() -> Self {
        Self(DEFAULT_FEATURE_NAMES.iter().map(|n| n.to_string()).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    /// Re-check invariants after deserialization
    pub fn validate(&self) -> Result<(), String> {
        Self::new(self.0.clone()).map(|_| ())
    }
}
