use std::fs;
use std::path::{Component, Path};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::dataset::{scan_dataset, Dataset, ImagingKind};
use crate::error::{Error, Result};
use crate::inference::{ArtifactPredictor, InferenceService, MockPredictor, Predictor};
use crate::job::{recover_interrupted, JobError, Orchestrator, OrchestratorConfig};
use crate::page::{Page, PageRequest};
use crate::registry::{ModelEntry, ModelStatus, Registry};
use crate::store::{FileStore, Store, StoreError};

/// Everything the service runs on, wired in start-up order: store, recovery,
/// registry, orchestrator, inference.
pub struct Services {
    pub config: ServiceConfig,
    pub store: Arc<dyn Store>,
    pub registry: Arc<Registry>,
    pub orchestrator: Orchestrator,
    pub inference: InferenceService,
}

impl Services {
    /// Opens the file store under the base directory and starts everything on
    /// top of it.
    pub fn open(config: ServiceConfig) -> Result<Services> {
        for dir in [config.datasets_dir(), config.models_dir()] {
            fs::create_dir_all(&dir).map_err(|source| StoreError::Io { path: dir.display().to_string(), source })?;
        }
        let store: Arc<dyn Store> = Arc::new(FileStore::open(&config.store_dir())?);
        Services::with_store(config, store)
    }

    /// Starts on an already opened store. Jobs left mid-flight by a previous
    /// process are failed before the dispatcher starts.
    pub fn with_store(config: ServiceConfig, store: Arc<dyn Store>) -> Result<Services> {
        let interrupted = recover_interrupted(store.as_ref())?;
        if !interrupted.is_empty() {
            warn!(count = interrupted.len(), jobs = ?interrupted, "interrupted jobs marked failed");
        }

        let registry = Arc::new(Registry::new(Arc::clone(&store), config.models_dir()));
        let orchestrator = Orchestrator::start(
            Arc::clone(&store),
            Arc::clone(&registry),
            OrchestratorConfig {
                max_concurrent_jobs: config.max_concurrent_jobs,
                status_retry: config.retry_policy(),
            },
        )?;
        let predictor: Box<dyn Predictor> = if config.mock_inference {
            info!("mock inference enabled");
            Box::new(MockPredictor::new())
        } else {
            Box::new(ArtifactPredictor::new())
        };
        let inference = InferenceService::new(Arc::clone(&registry), predictor);

        Ok(Services { config, store, registry, orchestrator, inference })
    }

    /// Changes a model's catalog status. Archived models are dropped from the
    /// inference cache.
    pub fn set_model_status(&self, id: &str, status: ModelStatus) -> Result<ModelEntry> {
        let entry = self.registry.set_status(id, status)?;
        if status == ModelStatus::Archived {
            self.inference.evict(id);
        }
        info!(model_id = %id, status = ?status, "model status changed");
        Ok(entry)
    }

    /// Scans `<datasets_dir>/<id>` and stores the result, replacing an earlier
    /// record with the same id but keeping its creation time.
    pub fn register_dataset(&self, id: &str, name: &str, kind: ImagingKind) -> Result<Dataset> {
        if !is_single_component(id) {
            return Err(Error::Validation(format!("invalid dataset id {id:?}")));
        }
        if name.trim().is_empty() {
            return Err(Error::Validation("dataset name must not be empty".into()));
        }
        let root = self.config.datasets_dir().join(id);
        if !root.is_dir() {
            return Err(JobError::DatasetNotFound(id.to_string()).into());
        }

        let mut dataset = scan_dataset(&root, id, name.trim(), kind)?;
        if let Some(previous) = self.store.get_dataset(id)? {
            dataset.created_at = previous.created_at;
        }
        self.store.save_dataset(&dataset)?;
        info!(
            dataset_id = %dataset.id,
            classes = dataset.classes.len(),
            samples = dataset.total_samples,
            status = ?dataset.status,
            "dataset registered"
        );
        Ok(dataset)
    }

    pub fn dataset(&self, id: &str) -> Result<Dataset> {
        self.store.get_dataset(id)?.ok_or_else(|| JobError::DatasetNotFound(id.to_string()).into())
    }

    /// Sorted by name.
    pub fn datasets(&self, page: PageRequest) -> Result<Page<Dataset>> {
        let mut all = self.store.list_datasets()?;
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Page::slice(all, page))
    }
}

fn is_single_component(id: &str) -> bool {
    let mut components = Path::new(id).components();
    matches!((components.next(), components.next()), (Some(Component::Normal(_)), None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_ids_are_plain_names() {
        assert!(is_single_component("chest-xray"));
        assert!(!is_single_component("../etc"));
        assert!(!is_single_component("a/b"));
        assert!(!is_single_component(""));
    }

    #[test]
    fn registering_keeps_creation_time() {
        let dir = tempfile::tempdir().unwrap();
        let services = Services::open(ServiceConfig::for_base_dir(dir.path())).unwrap();
        let class_dir = services.config.datasets_dir().join("ds").join("train").join("a");
        fs::create_dir_all(&class_dir).unwrap();
        fs::write(class_dir.join("0.png"), b"x").unwrap();

        let first = services.register_dataset("ds", "Set", ImagingKind::Xray).unwrap();
        let second = services.register_dataset("ds", "Set", ImagingKind::Xray).unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(services.datasets(PageRequest::default()).unwrap().total, 1);
        assert_eq!(services.dataset("ds").unwrap().train_samples, 1);
    }

    #[test]
    fn unknown_dataset_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let services = Services::open(ServiceConfig::for_base_dir(dir.path())).unwrap();
        let err = services.register_dataset("nope", "Nope", ImagingKind::Other).unwrap_err();
        assert_eq!(err.kind(), "DatasetNotFound");
        let err = services.register_dataset("..", "Up", ImagingKind::Other).unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }
}
