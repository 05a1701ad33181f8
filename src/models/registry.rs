//! Active model registry
//!
//! Holds the serving (backend, schema) pair behind a single `Arc`. Readers
//! clone the `Arc` under a short read lock and score without holding any
//! lock; `swap` builds the replacement pair first and only takes the write
//! lock to exchange the pointer.

use crate::models::backend::{BackendKind, ScoringBackend};
use crate::models::loader::{LoadedModel, ModelLoader};
use crate::types::patient::FeatureSchema;
use std::sync::{Arc, RwLock};
use tracing::info;

/// Immutable snapshot of the serving pair
pub struct ActiveModel {
    backend: Box<dyn ScoringBackend>,
    schema: FeatureSchema,
    version: u64,
}

impl ActiveModel {
    pub fn backend(&self) -> &dyn ScoringBackend {
        self.backend.as_ref()
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Registry version at which this pair became active
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }
}

/// Single-slot registry with atomic swap
pub struct ModelRegistry {
    active: RwLock<Arc<ActiveModel>>,
}

impl ModelRegistry {
    /// Registry serving the given pair at version 0
    pub fn new(model: LoadedModel) -> Self {
        Self {
            active: RwLock::new(Arc::new(ActiveModel {
                backend: model.backend,
                schema: model.schema,
                version: 0,
            })),
        }
    }

    /// Registry initialised from persisted state; never fails.
    pub fn load(loader: &ModelLoader) -> Self {
        let registry = Self::new(loader.load_or_fallback());
        info!(
            backend = ?registry.current().kind(),
            "Model registry initialized"
        );
        registry
    }

    /// Current pair. Safe to call concurrently with `swap`.
    pub fn current(&self) -> Arc<ActiveModel> {
        // The guarded value is a pointer that is always replaced whole, so a
        // poisoned lock still holds a consistent pair.
        let guard = self.active.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the active pair; returns the new version.
    pub fn swap(&self, backend: Box<dyn ScoringBackend>, schema: FeatureSchema) -> u64 {
        let kind = backend.kind();
        let mut replacement = ActiveModel {
            backend,
            schema,
            version: 0,
        };

        let (previous, version) = {
            let mut guard = self.active.write().unwrap_or_else(|e| e.into_inner());
            let version = guard.version + 1;
            replacement.version = version;
            let previous = std::mem::replace(&mut *guard, Arc::new(replacement));
            (previous, version)
        };

        info!(
            old_version = previous.version,
            new_version = version,
            old_backend = ?previous.kind(),
            new_backend = ?kind,
            "Model swapped"
        );
        version
    }

    pub fn version(&self) -> u64 {
        self.current().version
    }
}
