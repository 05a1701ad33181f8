//! Diabetes Risk Service Library
//!
//! Classifies patient feature vectors into a binary diabetes risk outcome
//! using a hot-swappable scoring backend, with a bounded prediction ledger
//! and a retrain pipeline that promotes new models without downtime.

pub mod config;
pub mod consumer;
pub mod error;
pub mod feature_extractor;
pub mod ledger;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod retrain;
pub mod serving;
pub mod types;

pub use config::AppConfig;
pub use consumer::{RequestConsumer, RequestKind};
pub use error::{ErrorKind, ServiceError};
pub use feature_extractor::FeatureExtractor;
pub use ledger::{LedgerReport, PredictionLedger};
pub use models::registry::ModelRegistry;
pub use producer::ReplyProducer;
pub use retrain::RetrainPipeline;
pub use serving::ServingFacade;
pub use types::{patient::FeatureVector, dataset::TrainingDataset};
