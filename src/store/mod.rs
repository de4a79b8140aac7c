pub mod file_store;
pub mod json_file;
pub mod retry;

use thiserror::Error;

use crate::dataset::Dataset;
use crate::job::Job;
use crate::registry::ModelEntry;

pub use file_store::FileStore;
pub use retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("store document {path} is unreadable: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("model {name}@{version} already registered")]
    DuplicateModel { name: String, version: String },

    #[error("dataset name {0:?} is already used by another dataset")]
    DuplicateDatasetName(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
}

/// Durable home of jobs, datasets and the model catalog.
///
/// Every write is durable when it returns `Ok`. Implementations are shared
/// between the request threads, the dispatcher and the job workers.
pub trait Store: Send + Sync {
    /// Inserts or replaces the job with the same id.
    fn save_job(&self, job: &Job) -> Result<(), StoreError>;
    fn get_job(&self, id: &str) -> Result<Option<Job>, StoreError>;
    fn list_jobs(&self) -> Result<Vec<Job>, StoreError>;
    /// Returns whether a record was removed.
    fn delete_job(&self, id: &str) -> Result<bool, StoreError>;

    /// Inserts or replaces by id; names must stay unique.
    fn save_dataset(&self, dataset: &Dataset) -> Result<(), StoreError>;
    fn get_dataset(&self, id: &str) -> Result<Option<Dataset>, StoreError>;
    fn list_datasets(&self) -> Result<Vec<Dataset>, StoreError>;

    /// Adds a new catalog entry. Fails with `DuplicateModel` when the
    /// `(name, version)` pair is taken.
    fn insert_model(&self, model: &ModelEntry) -> Result<(), StoreError>;
    /// Replaces an existing catalog entry.
    fn update_model(&self, model: &ModelEntry) -> Result<(), StoreError>;
    fn get_model(&self, id: &str) -> Result<Option<ModelEntry>, StoreError>;
    fn list_models(&self) -> Result<Vec<ModelEntry>, StoreError>;
}
