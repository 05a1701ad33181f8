//! Scoring backends and model lifecycle

pub mod backend;
pub mod forest;
pub mod loader;
pub mod registry;

pub use backend::{BackendKind, HeuristicFallback, ScoringBackend, TrainedClassifier};
pub use forest::{ForestConfig, RandomForest};
pub use loader::{LoadedModel, ModelArtifact, ModelLoader};
pub use registry::{ActiveModel, ModelRegistry};
