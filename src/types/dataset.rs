//! Labeled training table uploaded for retrain

use crate::error::ServiceError;
use serde::{Deserialize, Serialize};

/// Rectangular table of numeric rows; the last column is the binary label.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingDataset {
    /// Header names, when the upload carried them
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    pub rows: Vec<Vec<f64>>,
}

impl TrainingDataset {
    pub fn new(columns: Option<Vec<String>>, rows: Vec<Vec<f64>>) -> Self {
        Self { columns, rows }
    }

    /// Parse an upload: JSON objects are read as `{columns?, rows}`, anything
    /// else as CSV text.
    pub fn from_payload(payload: &[u8]) -> Result<Self, ServiceError> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| ServiceError::DatasetShape(format!("upload is not UTF-8: {}", e)))?;

        if text.trim_start().starts_with('{') {
            serde_json::from_str(text)
                .map_err(|e| ServiceError::DatasetShape(format!("invalid JSON dataset: {}", e)))
        } else {
            Self::from_csv(text)
        }
    }

    /// Parse comma-separated text. The first row is a header when any of
    /// its cells is not numeric.
    ///
    /// Cells may be wrapped in double quotes, but a quoted cell cannot itself
    /// contain a comma; such records are rejected rather than misaligned.
    pub fn from_csv(text: &str) -> Result<Self, ServiceError> {
        let mut lines = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .enumerate()
            .peekable();

        let mut columns = None;
        if let Some(&(record_no, first)) = lines.peek() {
            let cells = split_record(first, record_no)?;
            if cells.iter().any(|c| c.parse::<f64>().is_err()) {
                columns = Some(cells.iter().map(|c| c.to_string()).collect());
                lines.next();
            }
        }

        let mut rows = Vec::new();
        for (record_no, line) in lines {
            let row = split_record(line, record_no)?
                .into_iter()
                .map(|cell| {
                    cell.parse::<f64>().map_err(|_| {
                        ServiceError::DatasetShape(format!(
                            "record {}: '{}' is not numeric",
                            record_no + 1,
                            cell
                        ))
                    })
                })
                .collect::<Result<Vec<f64>, _>>()?;
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Column count, checking that every row has the same width
    pub fn n_columns(&self) -> Result<usize, ServiceError> {
        let width = match self.rows.first() {
            Some(row) => row.len(),
            None => return Err(ServiceError::DatasetShape("dataset has no rows".to_string())),
        };

        if let Some((idx, row)) = self.rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(ServiceError::DatasetShape(format!(
                "row {} has {} columns, expected {}",
                idx,
                row.len(),
                width
            )));
        }

        if let Some(columns) = &self.columns {
            if columns.len() != width {
                return Err(ServiceError::DatasetShape(format!(
                    "header has {} columns but rows have {}",
                    columns.len(),
                    width
                )));
            }
        }

        Ok(width)
    }

    /// Split into the first `n_features` columns and the last (label) column.
    pub fn features_and_labels(
        &self,
        n_features: usize,
    ) -> Result<(Vec<Vec<f64>>, Vec<u8>), ServiceError> {
        let width = self.n_columns()?;
        if width < n_features + 1 {
            return Err(ServiceError::DatasetShape(format!(
                "expected at least {} columns ({} features + label), got {}",
                n_features + 1,
                n_features,
                width
            )));
        }

        let mut features = Vec::with_capacity(self.rows.len());
        let mut labels = Vec::with_capacity(self.rows.len());

        for (idx, row) in self.rows.iter().enumerate() {
            let label = row[width - 1];
            let label = if label == 0.0 {
                0
            } else if label == 1.0 {
                1
            } else {
                return Err(ServiceError::DatasetShape(format!(
                    "row {}: label {} is not 0 or 1",
                    idx, label
                )));
            };

            if let Some(bad) = row[..n_features].iter().find(|v| !v.is_finite()) {
                return Err(ServiceError::DatasetShape(format!(
                    "row {}: feature value {} is not finite",
                    idx, bad
                )));
            }

            features.push(row[..n_features].to_vec());
            labels.push(label);
        }

        Ok((features, labels))
    }

    /// Header names of the first `n_features` columns, if present
    pub fn feature_names(&self, n_features: usize) -> Option<Vec<String>> {
        self.columns
            .as_ref()
            .filter(|c| c.len() > n_features)
            .map(|c| c[..n_features].to_vec())
    }
}

/// Split one CSV record into trimmed, unquoted cells
fn split_record(line: &str, record_no: usize) -> Result<Vec<&str>, ServiceError> {
    line.split(',')
        .map(|cell| {
            let cell = cell.trim();
            let opens = cell.starts_with('"');
            let closes = cell.len() > 1 && cell.ends_with('"');
            if opens != closes {
                return Err(ServiceError::DatasetShape(format!(
                    "record {}: quoted cells containing commas are not supported",
                    record_no + 1
                )));
            }
            Ok(cell.trim_matches('"'))
        })
        .collect()
}
