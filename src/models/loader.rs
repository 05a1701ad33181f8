//! Model artifact persistence
//!
//! A trained backend is persisted as two JSON files written and read as a
//! pair: the artifact (classifier plus metadata) and the feature schema. The
//! schema file carries the artifact's `model_id`; a pair whose ids differ is
//! rejected as corrupt.

use crate::config::ModelsConfig;
use crate::error::ServiceError;
use crate::models::backend::{HeuristicFallback, ScoringBackend, TrainedClassifier};
use crate::models::forest::RandomForest;
use crate::types::patient::{FeatureSchema, FEATURE_COUNT};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// Persisted form of a trained backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Unique identifier of this training run
    pub model_id: Uuid,
    pub trained_at: DateTime<Utc>,
    /// Rows in the uploaded dataset
    pub rows_trained: usize,
    /// Held-out accuracy at training time
    pub accuracy: f64,
    pub classifier: RandomForest,
}

impl ModelArtifact {
    pub fn new(classifier: RandomForest, rows_trained: usize, accuracy: f64) -> Self {
        Self {
            model_id: Uuid::new_v4(),
            trained_at: Utc::now(),
            rows_trained,
            accuracy,
            classifier,
        }
    }
}

/// On-disk form of the schema, bound to the artifact it was written with
#[derive(Debug, Serialize, Deserialize)]
struct SchemaFile {
    model_id: Uuid,
    features: FeatureSchema,
}

/// A backend together with the schema it was trained on
pub struct LoadedModel {
    pub backend: Box<dyn ScoringBackend>,
    pub schema: FeatureSchema,
}

impl LoadedModel {
    /// Heuristic backend bound to the default schema
    pub fn fallback() -> Self {
        Self {
            backend: Box::new(HeuristicFallback::new()),
            schema: FeatureSchema::default_schema(),
        }
    }
}

/// Reads and writes the artifact/schema pair
#[derive(Debug, Clone)]
pub struct ModelLoader {
    artifact_path: PathBuf,
    schema_path: PathBuf,
}

impl ModelLoader {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(artifact_path: P, schema_path: Q) -> Self {
        Self {
            artifact_path: artifact_path.as_ref().to_path_buf(),
            schema_path: schema_path.as_ref().to_path_buf(),
        }
    }

    pub fn from_config(config: &ModelsConfig) -> Self {
        Self::new(&config.artifact_path, &config.schema_path)
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    pub fn schema_path(&self) -> &Path {
        &self.schema_path
    }

    /// Load the persisted pair, failing with `ArtifactMissing` or
    /// `ArtifactCorrupt`.
    pub fn load(&self) -> Result<LoadedModel, ServiceError> {
        let artifact_json = read_file(&self.artifact_path)?;
        let schema_json = read_file(&self.schema_path)?;

        let artifact: ModelArtifact = serde_json::from_str(&artifact_json).map_err(|e| {
            ServiceError::ArtifactCorrupt(format!(
                "{}: {}",
                self.artifact_path.display(),
                e
            ))
        })?;
        let SchemaFile { model_id, features: schema } = serde_json::from_str(&schema_json)
            .map_err(|e| {
                ServiceError::ArtifactCorrupt(format!("{}: {}", self.schema_path.display(), e))
            })?;

        if model_id != artifact.model_id {
            return Err(ServiceError::ArtifactCorrupt(format!(
                "schema belongs to model {}, artifact is model {}",
                model_id, artifact.model_id
            )));
        }

        schema
            .validate()
            .map_err(|e| ServiceError::ArtifactCorrupt(format!("schema: {}", e)))?;
        artifact
            .classifier
            .validate()
            .map_err(|e| ServiceError::ArtifactCorrupt(format!("classifier: {}", e)))?;

        if schema.len() != FEATURE_COUNT || artifact.classifier.n_features() != schema.len() {
            return Err(ServiceError::ArtifactCorrupt(format!(
                "schema declares {} features, classifier expects {}, requests carry {}",
                schema.len(),
                artifact.classifier.n_features(),
                FEATURE_COUNT
            )));
        }

        info!(
            model_id = %artifact.model_id,
            trained_at = %artifact.trained_at,
            features = schema.len(),
            path = %self.artifact_path.display(),
            "Model artifact loaded"
        );

        Ok(LoadedModel {
            backend: Box::new(TrainedClassifier::new(artifact)),
            schema,
        })
    }

    /// Load the persisted pair, degrading to the heuristic on any failure.
    pub fn load_or_fallback(&self) -> LoadedModel {
        match self.load() {
            Ok(model) => model,
            Err(e) => {
                warn!(
                    error = %e,
                    kind = ?e.kind(),
                    "Using heuristic fallback backend"
                );
                LoadedModel::fallback()
            }
        }
    }

    /// Write the artifact and schema.
    ///
    /// Both files are staged as temporary siblings before either is renamed
    /// into place, so a failed write leaves the previous pair intact.
    pub fn persist(
        &self,
        artifact: &ModelArtifact,
        schema: &FeatureSchema,
    ) -> Result<(), ServiceError> {
        let artifact_json = serde_json::to_vec(artifact)
            .map_err(|e| ServiceError::Retrain(format!("serialize artifact: {}", e)))?;
        let schema_file = SchemaFile {
            model_id: artifact.model_id,
            features: schema.clone(),
        };
        let schema_json = serde_json::to_vec_pretty(&schema_file)
            .map_err(|e| ServiceError::Retrain(format!("serialize schema: {}", e)))?;

        let schema_tmp = stage(&self.schema_path, &schema_json)?;
        let artifact_tmp = match stage(&self.artifact_path, &artifact_json) {
            Ok(tmp) => tmp,
            Err(e) => {
                let _ = fs::remove_file(&schema_tmp);
                return Err(e);
            }
        };

        commit(&schema_tmp, &self.schema_path)?;
        commit(&artifact_tmp, &self.artifact_path)?;

        info!(
            model_id = %artifact.model_id,
            artifact = %self.artifact_path.display(),
            schema = %self.schema_path.display(),
            "Model artifact persisted"
        );
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<String, ServiceError> {
    fs::read_to_string(path).map_err(|e| match e.kind() {
        IoErrorKind::NotFound => ServiceError::ArtifactMissing(path.display().to_string()),
        _ => ServiceError::ArtifactCorrupt(format!("{}: {}", path.display(), e)),
    })
}

fn io_error(path: &Path, e: std::io::Error) -> ServiceError {
    ServiceError::Retrain(format!("{}: {}", path.display(), e))
}

/// Write `contents` to a `.tmp` sibling of `path` and return the sibling
fn stage(path: &Path, contents: &[u8]) -> Result<PathBuf, ServiceError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, contents).map_err(|e| io_error(path, e))?;
    Ok(tmp)
}

fn commit(tmp: &Path, path: &Path) -> Result<(), ServiceError> {
    fs::rename(tmp, path).map_err(|e| io_error(path, e))
}
