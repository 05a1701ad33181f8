//! Retrain pipeline
//!
//! Fits a new classifier from an uploaded dataset, persists it, reloads it
//! from disk and hands it to the registry. Any failure before the swap leaves
//! the serving pair untouched.

use crate::config::RetrainConfig;
use crate::error::ServiceError;
use crate::models::forest::RandomForest;
use crate::models::loader::{ModelArtifact, ModelLoader};
use crate::models::registry::ModelRegistry;
use crate::types::dataset::TrainingDataset;
use crate::types::patient::{FeatureSchema, FEATURE_COUNT};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of a successful retrain
#[derive(Debug, Clone)]
pub struct RetrainOutcome {
    /// Held-out accuracy (advisory; never gates the swap)
    pub accuracy: f64,
    pub train_accuracy: f64,
    pub rows_processed: usize,
    pub schema: FeatureSchema,
    /// Registry version now serving the new model
    pub version: u64,
    pub model_id: Uuid,
}

/// Produces a new artifact and swaps it into the registry
pub struct RetrainPipeline {
    config: RetrainConfig,
    loader: ModelLoader,
    /// Serialises runs so two uploads never interleave their file writes
    running: Mutex<()>,
}

impl RetrainPipeline {
    pub fn new(config: RetrainConfig, loader: ModelLoader) -> Self {
        Self {
            config,
            loader,
            running: Mutex::new(()),
        }
    }

    /// Train on `dataset` and promote the result.
    ///
    /// Blocks for the duration of training; the registry lock is only taken
    /// for the final swap.
    pub fn run(
        &self,
        dataset: &TrainingDataset,
        registry: &ModelRegistry,
    ) -> Result<RetrainOutcome, ServiceError> {
        let _running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        let started = Instant::now();

        let (x, y) = dataset.features_and_labels(FEATURE_COUNT)?;
        let schema = match dataset.feature_names(FEATURE_COUNT) {
            Some(names) => FeatureSchema::new(names)
                .map_err(|e| ServiceError::DatasetShape(format!("header: {}", e)))?,
            None => FeatureSchema::default_schema(),
        };
        let rows = x.len();

        let (train_idx, test_idx) = self.split(rows)?;
        let pick = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<u8>) {
            idx.iter().map(|&i| (x[i].clone(), y[i])).unzip()
        };
        let (x_train, y_train) = pick(&train_idx);
        let (x_test, y_test) = pick(&test_idx);

        let forest = RandomForest::fit(&x_train, &y_train, &self.config.forest())
            .map_err(ServiceError::Retrain)?;

        let train_accuracy = forest.accuracy(&x_train, &y_train).map_err(ServiceError::Retrain)?;
        let accuracy = if x_test.is_empty() {
            train_accuracy
        } else {
            forest.accuracy(&x_test, &y_test).map_err(ServiceError::Retrain)?
        };

        info!(
            rows,
            train_rows = x_train.len(),
            test_rows = x_test.len(),
            train_accuracy = format!("{:.3}", train_accuracy),
            test_accuracy = format!("{:.3}", accuracy),
            "Classifier trained"
        );
        if accuracy < 0.5 {
            warn!(accuracy, "Held-out accuracy below chance; promoting anyway");
        }

        let artifact = ModelArtifact::new(forest, rows, accuracy);
        let model_id = artifact.model_id;
        self.loader.persist(&artifact, &schema)?;

        // Serve exactly what was written, not the in-memory fit
        let reloaded = self
            .loader
            .load()
            .map_err(|e| ServiceError::Retrain(format!("reload after persist: {}", e)))?;
        if reloaded.backend.artifact().map(|a| a.model_id) != Some(model_id) {
            return Err(ServiceError::Retrain(
                "persisted artifact changed before reload".to_string(),
            ));
        }

        let schema = reloaded.schema.clone();
        let version = registry.swap(reloaded.backend, reloaded.schema);

        info!(
            model_id = %model_id,
            version,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Retrain complete"
        );

        Ok(RetrainOutcome {
            accuracy,
            train_accuracy,
            rows_processed: rows,
            schema,
            version,
            model_id,
        })
    }

    /// Seeded shuffle into (train, test) index sets; test takes
    /// `ceil(rows * test_fraction)` rows.
    fn split(&self, rows: usize) -> Result<(Vec<usize>, Vec<usize>), ServiceError> {
        let fraction = self.config.test_fraction.clamp(0.0, 1.0);
        let n_test = (rows as f64 * fraction).ceil() as usize;
        if n_test >= rows {
            return Err(ServiceError::Retrain(format!(
                "{} rows leave nothing to train on after a {:.0}% test split",
                rows,
                fraction * 100.0
            )));
        }

        let mut indices: Vec<usize> = (0..rows).collect();
        indices.shuffle(&mut StdRng::seed_from_u64(self.config.seed));
        let train = indices.split_off(n_test);
        Ok((train, indices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::backend::BackendKind;
    use crate::models::loader::LoadedModel;

    fn fast_config() -> RetrainConfig {
        RetrainConfig {
            n_estimators: 10,
            max_depth: 5,
            ..RetrainConfig::default()
        }
    }

    /// Rows whose label follows glucose > 140; other features are constant
    fn dataset(rows: usize, columns: usize) -> TrainingDataset {
        let data = (0..rows)
            .map(|i| {
                let glucose = 80.0 + (i % 120) as f64;
                let mut row = vec![2.0, glucose, 70.0, 20.0, 80.0, 30.0, 0.5, 40.0];
                row.resize(columns - 1, 1.0);
                row.push(if glucose > 140.0 { 1.0 } else { 0.0 });
                row
            })
            .collect();
        TrainingDataset::new(None, data)
    }

    fn setup(dir: &std::path::Path) -> (RetrainPipeline, ModelRegistry) {
        let loader = ModelLoader::new(dir.join("model.json"), dir.join("features.json"));
        let registry = ModelRegistry::load(&loader);
        (RetrainPipeline::new(fast_config(), loader), registry)
    }

    #[test]
    fn test_retrain_swaps_in_trained_model() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let (pipeline, registry) = setup(tmp.path());
        assert_eq!(registry.current().kind(), BackendKind::Heuristic);

        let outcome = pipeline.run(&dataset(200, 9), &registry).unwrap();

        assert!((0.0..=1.0).contains(&outcome.accuracy));
        assert!(outcome.accuracy > 0.8);
        assert_eq!(outcome.rows_processed, 200);
        assert_eq!(outcome.version, 1);

        let active = registry.current();
        assert_eq!(active.kind(), BackendKind::Trained);
        assert_eq!(active.schema(), &outcome.schema);
        assert_eq!(
            active.backend().artifact().map(|a| a.model_id),
            Some(outcome.model_id)
        );
    }

    #[test]
    fn test_persisted_artifact_matches_served_model() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let (pipeline, registry) = setup(tmp.path());
        let outcome = pipeline.run(&dataset(100, 9), &registry).unwrap();

        // A fresh process would load the same model
        let loader = ModelLoader::new(tmp.path().join("model.json"), tmp.path().join("features.json"));
        let LoadedModel { backend, schema } = loader.load().unwrap();
        assert_eq!(backend.artifact().map(|a| a.model_id), Some(outcome.model_id));
        assert_eq!(schema, outcome.schema);
    }

    #[test]
    fn test_eight_columns_is_dataset_shape_error() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let (pipeline, registry) = setup(tmp.path());
        let no_label = TrainingDataset::new(None, vec![vec![1.0; 8]; 20]);

        let err = pipeline.run(&no_label, &registry).unwrap_err();
        assert!(matches!(err, ServiceError::DatasetShape(_)));
        assert_eq!(registry.version(), 0);
        assert_eq!(registry.current().kind(), BackendKind::Heuristic);
        assert!(!tmp.path().join("model.json").exists());
    }

    #[test]
    fn test_wide_dataset_uses_first_features_and_last_label() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let (pipeline, registry) = setup(tmp.path());

        let outcome = pipeline.run(&dataset(120, 11), &registry).unwrap();
        assert_eq!(outcome.schema.len(), FEATURE_COUNT);
        assert!((0.0..=1.0).contains(&outcome.accuracy));
    }

    #[test]
    fn test_header_names_become_schema() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let (pipeline, registry) = setup(tmp.path());

        let mut ds = dataset(60, 9);
        ds.columns = Some(
            ["preg", "glu", "bp", "skin", "ins", "bmi", "dpf", "age", "Outcome"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );

        let outcome = pipeline.run(&ds, &registry).unwrap();
        assert_eq!(outcome.schema.names()[1], "glu");
        assert_eq!(registry.current().schema().names()[7], "age");
    }

    #[test]
    fn test_failed_retrain_keeps_previous_model() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let (pipeline, registry) = setup(tmp.path());
        let first = pipeline.run(&dataset(80, 9), &registry).unwrap();

        let single_row = dataset(1, 9);
        let err = pipeline.run(&single_row, &registry).unwrap_err();
        assert!(matches!(err, ServiceError::Retrain(_)));

        let active = registry.current();
        assert_eq!(active.version(), first.version);
        assert_eq!(
            active.backend().artifact().map(|a| a.model_id),
            Some(first.model_id)
        );
    }

    #[test]
    fn test_failed_persist_keeps_previous_pair_on_disk() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let (pipeline, registry) = setup(tmp.path());
        let first = pipeline.run(&dataset(80, 9), &registry).unwrap();

        std::fs::create_dir(tmp.path().join("model.json.tmp")).unwrap();
        let mut renamed = dataset(80, 9);
        renamed.columns = Some(
            ["a", "b", "c", "d", "e", "f", "g", "h", "Outcome"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        let err = pipeline.run(&renamed, &registry).unwrap_err();
        assert!(matches!(err, ServiceError::Retrain(_)));
        assert_eq!(registry.version(), first.version);

        // A restart would serve the first model with its own schema
        let loader = ModelLoader::new(tmp.path().join("model.json"), tmp.path().join("features.json"));
        let LoadedModel { backend, schema } = loader.load().unwrap();
        assert_eq!(backend.artifact().map(|a| a.model_id), Some(first.model_id));
        assert_eq!(schema, first.schema);
        assert_eq!(schema.names()[0], "Pregnancies");
    }

    #[test]
    fn test_split_is_seeded_and_sized() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let (pipeline, _) = setup(tmp.path());

        let (train, test) = pipeline.split(101).unwrap();
        assert_eq!(test.len(), 21);
        assert_eq!(train.len(), 80);
        assert_eq!(pipeline.split(101).unwrap(), (train, test));
    }
}
