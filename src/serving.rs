//! Serving facade
//!
//! Composition root for the four caller-facing operations. A predict request
//! moves through validate -> resolve backend -> score -> classify -> log ->
//! respond; validation and inference failures return early and are never
//! logged to the ledger.

use crate::config::{AppConfig, DetectionConfig};
use crate::error::ServiceError;
use crate::feature_extractor::FeatureExtractor;
use crate::ledger::{LedgerReport, PredictionLedger};
use crate::metrics::ServiceMetrics;
use crate::models::backend::BackendKind;
use crate::models::loader::ModelLoader;
use crate::models::registry::ModelRegistry;
use crate::retrain::RetrainPipeline;
use crate::types::dataset::TrainingDataset;
use crate::types::patient::FeatureVector;
use crate::types::prediction::{
    HealthReport, PredictionRecord, PredictionResponse, RetrainReport, RiskLevel,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

pub struct ServingFacade {
    registry: ModelRegistry,
    ledger: PredictionLedger,
    retrain: RetrainPipeline,
    extractor: FeatureExtractor,
    detection: DetectionConfig,
    metrics: Arc<ServiceMetrics>,
    /// Single slot uploads queue on before taking a blocking thread
    retrain_slot: Semaphore,
}

impl ServingFacade {
    pub fn new(
        registry: ModelRegistry,
        ledger: PredictionLedger,
        retrain: RetrainPipeline,
        detection: DetectionConfig,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            registry,
            ledger,
            retrain,
            extractor: FeatureExtractor::new(),
            detection,
            metrics,
            retrain_slot: Semaphore::new(1),
        }
    }

    /// Build every component from configuration, loading the persisted
    /// model or falling back to the heuristic.
    pub fn from_config(config: &AppConfig, metrics: Arc<ServiceMetrics>) -> Self {
        let loader = ModelLoader::from_config(&config.models);
        let registry = ModelRegistry::load(&loader);
        let ledger = PredictionLedger::with_settings(
            config.ledger.capacity,
            config.ledger.min_records_for_metrics,
            config.ledger.window_hours,
        );
        let retrain = RetrainPipeline::new(config.retrain.clone(), loader);

        Self::new(registry, ledger, retrain, config.detection.clone(), metrics)
    }

    /// Validate a raw request body and predict.
    pub fn predict_json(&self, payload: &[u8]) -> Result<PredictionResponse, ServiceError> {
        let features = self.extractor.extract_bytes(payload).map_err(|e| {
            self.metrics.record_rejection();
            debug!(error = %e, "Prediction request rejected");
            e
        })?;
        self.predict(&features)
    }

    /// Score a validated feature vector.
    pub fn predict(&self, features: &FeatureVector) -> Result<PredictionResponse, ServiceError> {
        let started = Instant::now();
        let active = self.registry.current();

        let probability = active
            .backend()
            .predict_probability(&features.to_array())
            .and_then(|p| {
                if (0.0..=1.0).contains(&p) {
                    Ok(p)
                } else {
                    Err(ServiceError::Inference(format!(
                        "backend returned probability {} outside [0, 1]",
                        p
                    )))
                }
            })
            .map_err(|e| {
                self.metrics.record_inference_failure();
                error!(
                    error = %e,
                    version = active.version(),
                    backend = ?active.kind(),
                    "Inference failed"
                );
                e
            })?;

        let prediction = u8::from(probability > self.detection.threshold);
        let risk = self
            .detection
            .include_risk
            .then(|| RiskLevel::from_probability(probability, &self.detection.risk_levels));

        self.ledger
            .append(PredictionRecord::new(*features, prediction, probability));

        let elapsed = started.elapsed();
        self.metrics.record_prediction(elapsed);
        debug!(
            probability,
            prediction,
            version = active.version(),
            processing_time_us = elapsed.as_micros() as u64,
            "Prediction served"
        );

        Ok(PredictionResponse {
            prediction,
            probability,
            risk,
        })
    }

    /// Service status. `model_loaded` is true only for a trained classifier.
    pub fn health(&self) -> HealthReport {
        let active = self.registry.current();
        let artifact = active.backend().artifact();

        HealthReport {
            status: "healthy".to_string(),
            model_loaded: active.kind() == BackendKind::Trained,
            backend: active.kind(),
            model_version: active.version(),
            model_id: artifact.map(|a| a.model_id),
            trained_at: artifact.map(|a| a.trained_at),
        }
    }

    /// Aggregates over the prediction ledger
    pub fn metrics(&self) -> LedgerReport {
        self.ledger.metrics()
    }

    /// Train on `dataset` and swap the result in. Blocking.
    pub fn retrain(&self, dataset: &TrainingDataset) -> Result<RetrainReport, ServiceError> {
        info!(rows = dataset.n_rows(), "Retrain requested");

        match self.retrain.run(dataset, &self.registry) {
            Ok(outcome) => {
                self.metrics.record_retrain(true);
                Ok(RetrainReport {
                    accuracy: outcome.accuracy,
                    rows_processed: outcome.rows_processed,
                })
            }
            Err(e) => {
                self.metrics.record_retrain(false);
                warn!(error = %e, kind = ?e.kind(), "Retrain failed; previous model stays active");
                Err(e)
            }
        }
    }

    /// Parse an uploaded dataset and retrain on the blocking pool.
    ///
    /// Uploads wait on the retrain slot, so queued retrains hold neither
    /// request workers nor blocking threads.
    pub async fn retrain_upload(
        self: Arc<Self>,
        payload: Vec<u8>,
    ) -> Result<RetrainReport, ServiceError> {
        let _slot = self
            .retrain_slot
            .acquire()
            .await
            .map_err(|e| ServiceError::Retrain(e.to_string()))?;

        let trainer = self.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let dataset = TrainingDataset::from_payload(&payload)?;
            trainer.retrain(&dataset)
        })
        .await;

        self.settle_retrain(joined)
    }

    /// Turn a crashed retrain task into a `Retrain` error for the caller
    fn settle_retrain(
        &self,
        joined: Result<Result<RetrainReport, ServiceError>, JoinError>,
    ) -> Result<RetrainReport, ServiceError> {
        joined.unwrap_or_else(|e| {
            self.metrics.record_retrain(false);
            error!(error = %e, "Retrain task failed");
            Err(ServiceError::Retrain(format!("retrain task failed: {}", e)))
        })
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &PredictionLedger {
        &self.ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::backend::ScoringBackend;
    use crate::models::loader::LoadedModel;
    use crate::types::patient::FeatureSchema;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    struct Constant(f64);

    impl ScoringBackend for Constant {
        fn predict_probability(&self, _features: &[f64]) -> Result<f64, ServiceError> {
            Ok(self.0)
        }

        fn kind(&self) -> BackendKind {
            BackendKind::Trained
        }
    }

    struct Failing;

    impl ScoringBackend for Failing {
        fn predict_probability(&self, _features: &[f64]) -> Result<f64, ServiceError> {
            Err(ServiceError::Inference("model exploded".to_string()))
        }

        fn kind(&self) -> BackendKind {
            BackendKind::Trained
        }
    }

    fn facade_in(dir: &std::path::Path) -> ServingFacade {
        let mut config = AppConfig::default();
        config.models.artifact_path = dir.join("model.json").display().to_string();
        config.models.schema_path = dir.join("features.json").display().to_string();
        config.retrain.n_estimators = 10;
        config.retrain.max_depth = 5;
        ServingFacade::from_config(&config, Arc::new(ServiceMetrics::new()))
    }

    fn reference_patient() -> FeatureVector {
        FeatureVector {
            pregnancies: 1,
            glucose: 100.0,
            blood_pressure: 70.0,
            skin_thickness: 20.0,
            insulin: 80.0,
            bmi: 25.0,
            diabetes_pedigree: 0.5,
            age: 30,
        }
    }

    fn labeled_rows(n: usize) -> TrainingDataset {
        let rows = (0..n)
            .map(|i| {
                let glucose = 70.0 + (i % 130) as f64;
                vec![
                    1.0,
                    glucose,
                    70.0,
                    20.0,
                    80.0,
                    28.0,
                    0.5,
                    35.0,
                    if glucose > 140.0 { 1.0 } else { 0.0 },
                ]
            })
            .collect();
        TrainingDataset::new(None, rows)
    }

    #[test]
    fn test_heuristic_reference_prediction() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let facade = facade_in(tmp.path());

        let response = facade.predict(&reference_patient()).unwrap();
        assert!((response.probability - 0.42).abs() < 1e-9);
        assert_eq!(response.prediction, 0);
        assert_eq!(response.risk, Some(RiskLevel::Medium));
        assert_eq!(facade.ledger().len(), 1);
    }

    #[test]
    fn test_exact_threshold_is_negative() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let facade = facade_in(tmp.path());

        facade
            .registry()
            .swap(Box::new(Constant(0.5)), FeatureSchema::default_schema());
        assert_eq!(facade.predict(&reference_patient()).unwrap().prediction, 0);

        facade
            .registry()
            .swap(Box::new(Constant(0.5000001)), FeatureSchema::default_schema());
        assert_eq!(facade.predict(&reference_patient()).unwrap().prediction, 1);
    }

    #[test]
    fn test_validation_failure_is_not_logged() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let facade = facade_in(tmp.path());

        let err = facade.predict_json(br#"{"glucose": "high"}"#).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ValidationError);
        assert!(facade.ledger().is_empty());
        assert_eq!(facade.metrics.predictions_rejected.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_inference_failure_is_not_logged() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let facade = facade_in(tmp.path());
        facade
            .registry()
            .swap(Box::new(Failing), FeatureSchema::default_schema());

        let err = facade.predict(&reference_patient()).unwrap_err();
        assert!(matches!(err, ServiceError::Inference(_)));
        assert!(!err.is_client_error());
        assert!(facade.ledger().is_empty());
    }

    #[test]
    fn test_out_of_range_probability_is_inference_error() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let facade = facade_in(tmp.path());
        facade
            .registry()
            .swap(Box::new(Constant(1.5)), FeatureSchema::default_schema());

        assert!(matches!(
            facade.predict(&reference_patient()),
            Err(ServiceError::Inference(_))
        ));
    }

    #[test]
    fn test_predict_json_roundtrip() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let facade = facade_in(tmp.path());
        let body = json!({
            "pregnancies": 1, "glucose": 100, "blood_pressure": 70,
            "skin_thickness": 20, "insulin": 80, "bmi": 25,
            "diabetes_pedigree": 0.5, "age": 30
        });

        let response = facade
            .predict_json(body.to_string().as_bytes())
            .unwrap();
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["prediction"], 0);
        assert_eq!(json["risk"], "medium");
    }

    #[test]
    fn test_health_distinguishes_fallback_from_trained() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let facade = facade_in(tmp.path());

        let health = facade.health();
        assert_eq!(health.status, "healthy");
        assert!(!health.model_loaded);
        assert_eq!(health.backend, BackendKind::Heuristic);
        assert!(health.model_id.is_none());

        facade.retrain(&labeled_rows(150)).unwrap();

        let health = facade.health();
        assert!(health.model_loaded);
        assert_eq!(health.backend, BackendKind::Trained);
        assert_eq!(health.model_version, 1);
        assert!(health.model_id.is_some());
    }

    #[test]
    fn test_metrics_need_ten_predictions() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let facade = facade_in(tmp.path());

        for _ in 0..9 {
            facade.predict(&reference_patient()).unwrap();
        }
        assert!(matches!(
            facade.metrics(),
            LedgerReport::InsufficientData { count: 9, .. }
        ));

        facade.predict(&reference_patient()).unwrap();
        let LedgerReport::Metrics(m) = facade.metrics() else {
            panic!("expected metrics");
        };
        assert_eq!(m.total_predictions, 10);
        assert!((m.average_probability - 0.42).abs() < 1e-9);
        assert_eq!(m.positive_rate, 0.0);
        assert_eq!(m.predictions_last_24h, 10);
    }

    #[test]
    fn test_retrain_results() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let facade = facade_in(tmp.path());

        let report = facade.retrain(&labeled_rows(100)).unwrap();
        assert!((0.0..=1.0).contains(&report.accuracy));
        assert_eq!(report.rows_processed, 100);

        let no_label = TrainingDataset::new(None, vec![vec![0.0; 8]; 10]);
        let err = facade.retrain(&no_label).unwrap_err();
        assert!(matches!(err, ServiceError::DatasetShape(_)));
        assert_eq!(facade.health().model_version, 1);
    }

    #[tokio::test]
    async fn test_retrain_upload_parses_and_trains() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let facade = Arc::new(facade_in(tmp.path()));

        let mut csv = String::from("preg,glu,bp,skin,ins,bmi,dpf,age,Outcome\n");
        for row in labeled_rows(60).rows {
            let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            csv.push_str(&cells.join(","));
            csv.push('\n');
        }

        let report = facade.clone().retrain_upload(csv.into_bytes()).await.unwrap();
        assert_eq!(report.rows_processed, 60);
        assert_eq!(facade.registry().current().schema().names()[1], "glu");

        let err = facade
            .clone()
            .retrain_upload(b"1,2,3\n4,5,6\n".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::DatasetShape(_)));
        assert_eq!(facade.health().model_version, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_queued_uploads_train_one_after_another() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let facade = Arc::new(facade_in(tmp.path()));
        let upload = br#"{"rows": [[1,90,70,20,80,28,0.5,35,0],[1,95,70,20,80,28,0.5,35,0],[1,100,70,20,80,28,0.5,35,0],[1,150,70,20,80,28,0.5,35,1],[1,160,70,20,80,28,0.5,35,1],[1,170,70,20,80,28,0.5,35,1]]}"#.to_vec();

        let (first, second) = tokio::join!(
            facade.clone().retrain_upload(upload.clone()),
            facade.clone().retrain_upload(upload),
        );
        assert!(first.is_ok() && second.is_ok());
        assert_eq!(facade.health().model_version, 2);
        assert!(facade.predict(&reference_patient()).is_ok());
    }

    #[tokio::test]
    async fn test_crashed_retrain_task_becomes_retrain_error() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let facade = facade_in(tmp.path());

        let joined = tokio::task::spawn_blocking(|| -> Result<RetrainReport, ServiceError> {
            panic!("training thread died")
        })
        .await;

        let err = facade.settle_retrain(joined).unwrap_err();
        assert!(matches!(err, ServiceError::Retrain(_)));
        assert_eq!(err.to_reply().error, crate::error::ErrorKind::RetrainError);
        assert_eq!(facade.metrics.retrains_failed.load(Ordering::Relaxed), 1);
        assert_eq!(facade.health().model_version, 0);
    }

    #[test]
    fn test_predictions_during_retrain_use_a_whole_pair() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let facade = facade_in(tmp.path());
        let patient = reference_patient();

        let observed: Vec<f64> = std::thread::scope(|scope| {
            let readers: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        (0..200)
                            .map(|_| facade.predict(&patient).unwrap().probability)
                            .collect::<Vec<f64>>()
                    })
                })
                .collect();

            scope.spawn(|| facade.retrain(&labeled_rows(120)).unwrap());

            readers
                .into_iter()
                .flat_map(|reader| reader.join().unwrap())
                .collect()
        });

        let active = facade.registry().current();
        assert_eq!(active.kind(), BackendKind::Trained);
        let trained = active
            .backend()
            .predict_probability(&patient.to_array())
            .unwrap();

        // Every answer came from exactly one of the two backends
        for probability in observed {
            assert!((probability - 0.42).abs() < 1e-9 || probability == trained);
        }
        assert_eq!(facade.predict(&patient).unwrap().probability, trained);
    }

    #[test]
    fn test_risk_can_be_omitted() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let loader = ModelLoader::new(tmp.path().join("m.json"), tmp.path().join("f.json"));
        let mut detection = AppConfig::default().detection;
        detection.include_risk = false;

        let facade = ServingFacade::new(
            ModelRegistry::new(LoadedModel::fallback()),
            PredictionLedger::default(),
            RetrainPipeline::new(Default::default(), loader),
            detection,
            Arc::new(ServiceMetrics::new()),
        );

        assert!(facade.predict(&reference_patient()).unwrap().risk.is_none());
    }
}
