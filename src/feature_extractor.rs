//! Request validation for patient feature vectors.
//!
//! Turns an inbound JSON request into a [`FeatureVector`]. Only type coercion
//! is enforced here; values outside biological ranges (for example `age <= 0`)
//! are accepted and left to the caller.

use crate::error::ServiceError;
use crate::types::patient::{FeatureVector, FEATURE_COUNT};
use serde_json::{Map, Value};

/// Validates inbound requests into feature vectors.
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Validate a raw request body.
    pub fn extract_bytes(&self, payload: &[u8]) -> Result<FeatureVector, ServiceError> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| ServiceError::Validation(format!("request is not valid JSON: {}", e)))?;
        self.extract(&value)
    }

    /// Validate a parsed request.
    pub fn extract(&self, request: &Value) -> Result<FeatureVector, ServiceError> {
        let fields = request
            .as_object()
            .ok_or_else(|| ServiceError::Validation("request must be a JSON object".to_string()))?;

        Ok(FeatureVector {
            pregnancies: integer_field(fields, "pregnancies")?,
            glucose: real_field(fields, "glucose")?,
            blood_pressure: real_field(fields, "blood_pressure")?,
            skin_thickness: real_field(fields, "skin_thickness")?,
            insulin: real_field(fields, "insulin")?,
            bmi: real_field(fields, "bmi")?,
            diabetes_pedigree: real_field(fields, "diabetes_pedigree")?,
            age: integer_field(fields, "age")?,
        })
    }

    pub fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn lookup<'a>(fields: &'a Map<String, Value>, name: &str) -> Result<&'a Value, ServiceError> {
    match fields.get(name) {
        None | Some(Value::Null) => Err(ServiceError::Validation(format!(
            "missing field '{}'",
            name
        ))),
        Some(value) => Ok(value),
    }
}

fn real_field(fields: &Map<String, Value>, name: &str) -> Result<f64, ServiceError> {
    let value = lookup(fields, name)?;
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(ServiceError::Validation(format!(
            "field '{}' must be a number, got {}",
            name, value
        ))),
    }
}

fn integer_field(fields: &Map<String, Value>, name: &str) -> Result<i64, ServiceError> {
    let value = lookup(fields, name)?;
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    };

    parsed.ok_or_else(|| {
        ServiceError::Validation(format!(
            "field '{}' must be an integer, got {}",
            name, value
        ))
    })
}

/// Accept floats with no fractional part, like `2.0`
fn integral(v: f64) -> Option<i64> {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "pregnancies": 1,
            "glucose": 100.0,
            "blood_pressure": 70.0,
            "skin_thickness": 20.0,
            "insulin": 80.0,
            "bmi": 25.0,
            "diabetes_pedigree": 0.5,
            "age": 30
        })
    }

    #[test]
    fn test_extract_valid_request() {
        let extractor = FeatureExtractor::new();
        let fv = extractor.extract(&sample()).unwrap();

        assert_eq!(fv.pregnancies, 1);
        assert_eq!(fv.glucose, 100.0);
        assert_eq!(fv.age, 30);
        assert_eq!(fv.to_array().len(), extractor.feature_count());
    }

    #[test]
    fn test_coerces_integral_floats_and_numeric_strings() {
        let mut req = sample();
        req["pregnancies"] = json!(2.0);
        req["age"] = json!("41");
        req["bmi"] = json!("31.2");

        let fv = FeatureExtractor::new().extract(&req).unwrap();
        assert_eq!(fv.pregnancies, 2);
        assert_eq!(fv.age, 41);
        assert_eq!(fv.bmi, 31.2);
    }

    #[test]
    fn test_rejects_fractional_integer_field() {
        let mut req = sample();
        req["age"] = json!(30.5);

        let err = FeatureExtractor::new().extract(&req).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn test_rejects_missing_and_mistyped_fields() {
        let extractor = FeatureExtractor::new();

        let mut missing = sample();
        missing.as_object_mut().unwrap().remove("glucose");
        assert!(matches!(
            extractor.extract(&missing),
            Err(ServiceError::Validation(_))
        ));

        let mut wrong = sample();
        wrong["insulin"] = json!(true);
        assert!(matches!(
            extractor.extract(&wrong),
            Err(ServiceError::Validation(_))
        ));

        assert!(extractor.extract(&json!([1, 2, 3])).is_err());
        assert!(extractor.extract_bytes(b"not json").is_err());
    }

    #[test]
    fn test_out_of_range_values_accepted() {
        let mut req = sample();
        req["age"] = json!(0);
        req["glucose"] = json!(-5.0);

        let fv = FeatureExtractor::new().extract(&req).unwrap();
        assert_eq!(fv.age, 0);
        assert_eq!(fv.glucose, -5.0);
    }
}
