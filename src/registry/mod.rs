pub mod catalog;
pub mod sync;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::dataset::Dataset;
use crate::job::Job;
use crate::network::{save_artifact, ModelMetadata, Network, NetworkError};
use crate::page::{Page, PageRequest};
use crate::store::{Store, StoreError};

pub use catalog::{
    preprocessing_for, ModelEntry, ModelStatus, ModelType, Performance, PreprocessingStep, TrainedOn,
};
pub use sync::SyncReport;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("model {0} not found")]
    NotFound(String),

    #[error("model {name}@{version} already registered")]
    AlreadyRegistered { name: String, version: String },

    #[error("{0}")]
    Validation(String),

    #[error("cannot write artifact: {0}")]
    Artifact(#[source] NetworkError),

    #[error("cannot scan {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for RegistryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateModel { name, version } => RegistryError::AlreadyRegistered { name, version },
            StoreError::NotFound { id, .. } => RegistryError::NotFound(id),
            other => RegistryError::Store(other),
        }
    }
}

/// What a finished job hands to the registry.
pub struct TrainedModel<'a> {
    pub job: &'a Job,
    pub dataset: &'a Dataset,
    pub class_names: &'a [String],
    pub network: &'a Network,
    pub performance: Performance,
    pub learning_rate: f32,
}

#[derive(Debug, Clone, Default)]
pub struct ModelQuery {
    pub model_type: Option<ModelType>,
    pub status: Option<ModelStatus>,
    pub search: Option<String>,
    pub page: PageRequest,
}

/// Owns the artifact tree under `models_dir` and the model catalog.
pub struct Registry {
    store: Arc<dyn Store>,
    models_dir: PathBuf,
    // serializes read-modify-write of catalog entries
    edit_lock: Mutex<()>,
}

impl Registry {
    pub fn new(store: Arc<dyn Store>, models_dir: PathBuf) -> Registry {
        Registry { store, models_dir, edit_lock: Mutex::new(()) }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Stable artifact directory for a job.
    pub fn artifact_dir(&self, job_id: &str) -> PathBuf {
        self.models_dir.join(job_id)
    }

    /// Writes the artifact for `trained.job` and adds its catalog entry with
    /// status `testing`. On a `(name, version)` collision the artifact stays on
    /// disk and `AlreadyRegistered` is returned.
    ///
    /// Holds the catalog lock across both steps so `sync` never sees the
    /// artifact without its entry.
    pub fn register_trained(&self, trained: TrainedModel<'_>) -> Result<ModelEntry, RegistryError> {
        let _guard = self.edit_lock.lock();
        let job = trained.job;
        let dir = self.artifact_dir(&job.id);
        let metadata = ModelMetadata {
            name: job.target.name.clone(),
            version: job.target.version.clone(),
            class_names: trained.class_names.to_vec(),
            input_shape: job.target.input_shape,
            job_id: Some(job.id.clone()),
            description: job.target.description.clone(),
        };
        save_artifact(trained.network, &metadata, trained.learning_rate, &dir).map_err(RegistryError::Artifact)?;

        let now = Utc::now();
        let entry = ModelEntry {
            id: Uuid::new_v4().to_string(),
            name: metadata.name,
            version: metadata.version,
            description: metadata.description,
            model_type: job.target.model_type,
            applicable_tags: job.target.applicable_tags.clone(),
            class_names: metadata.class_names,
            input_shape: metadata.input_shape,
            preprocessing: preprocessing_for(metadata.input_shape),
            performance: trained.performance,
            trained_on: Some(TrainedOn {
                dataset_name: trained.dataset.name.clone(),
                dataset_size: trained.dataset.total_samples,
                train_date: now,
            }),
            artifact_path: dir,
            status: ModelStatus::Testing,
            usage_count: 0,
            last_used: None,
            created_by: job.submitted_by.clone(),
            job_id: Some(job.id.clone()),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_model(&entry)?;
        info!(model_id = %entry.id, name = %entry.name, version = %entry.version, job_id = %job.id, "model registered");
        Ok(entry)
    }

    pub fn get(&self, id: &str) -> Result<ModelEntry, RegistryError> {
        self.store.get_model(id)?.ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    pub fn set_status(&self, id: &str, status: ModelStatus) -> Result<ModelEntry, RegistryError> {
        self.edit(id, |entry| entry.status = status)
    }

    /// Bumps the usage counter and stamps `lastUsed`.
    pub fn record_usage(&self, id: &str) -> Result<ModelEntry, RegistryError> {
        self.edit(id, |entry| {
            entry.usage_count += 1;
            entry.last_used = Some(Utc::now());
        })
    }

    fn edit(&self, id: &str, change: impl FnOnce(&mut ModelEntry)) -> Result<ModelEntry, RegistryError> {
        let _guard = self.edit_lock.lock();
        let mut entry = self.get(id)?;
        change(&mut entry);
        entry.updated_at = Utc::now();
        self.store.update_model(&entry)?;
        Ok(entry)
    }

    /// Filtered catalog, newest first.
    pub fn list(&self, query: &ModelQuery) -> Result<Page<ModelEntry>, RegistryError> {
        let mut entries: Vec<ModelEntry> = self
            .store
            .list_models()?
            .into_iter()
            .filter(|m| query.model_type.map_or(true, |t| m.model_type == t))
            .filter(|m| query.status.map_or(true, |s| m.status == s))
            .filter(|m| query.search.as_deref().map_or(true, |s| m.matches_search(s)))
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::slice(entries, query.page))
    }
}
