use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::info;

use crate::dataset::Dataset;
use crate::job::Job;
use crate::registry::ModelEntry;
use crate::store::json_file::{read_or_initialize, write_json_file};
use crate::store::{Store, StoreError};

const JOBS_FILE: &str = "jobs.json";
const DATASETS_FILE: &str = "datasets.json";
const MODELS_FILE: &str = "models.json";

/// One JSON document per collection; the in-memory copy is only replaced
/// after the new document is on disk.
struct Collection<T> {
    path: PathBuf,
    items: Mutex<Vec<T>>,
}

impl<T> Collection<T>
where
    T: Clone + serde::Serialize + serde::de::DeserializeOwned,
{
    fn open(path: PathBuf) -> Result<Collection<T>, StoreError> {
        let items = read_or_initialize(&path, Vec::new())?;
        Ok(Collection { path, items: Mutex::new(items) })
    }

    fn snapshot(&self) -> Vec<T> {
        self.items.lock().clone()
    }

    fn find(&self, pred: impl Fn(&T) -> bool) -> Option<T> {
        self.items.lock().iter().find(|t| pred(t)).cloned()
    }

    /// Applies `edit` to a copy, persists it, then commits it in memory.
    fn write<R>(&self, edit: impl FnOnce(&mut Vec<T>) -> Result<R, StoreError>) -> Result<R, StoreError> {
        let mut items = self.items.lock();
        let mut next = items.clone();
        let result = edit(&mut next)?;
        write_json_file(&self.path, &next)?;
        *items = next;
        Ok(result)
    }
}

/// `Store` backed by `jobs.json`, `datasets.json` and `models.json` in one
/// directory.
pub struct FileStore {
    dir: PathBuf,
    jobs: Collection<Job>,
    datasets: Collection<Dataset>,
    models: Collection<ModelEntry>,
}

impl FileStore {
    /// Opens (creating when missing) the store documents under `dir`.
    pub fn open(dir: &Path) -> Result<FileStore, StoreError> {
        std::fs::create_dir_all(dir).map_err(|source| StoreError::Io { path: dir.display().to_string(), source })?;
        let store = FileStore {
            dir: dir.to_path_buf(),
            jobs: Collection::open(dir.join(JOBS_FILE))?,
            datasets: Collection::open(dir.join(DATASETS_FILE))?,
            models: Collection::open(dir.join(MODELS_FILE))?,
        };
        info!(
            dir = %store.dir.display(),
            jobs = store.jobs.items.lock().len(),
            datasets = store.datasets.items.lock().len(),
            models = store.models.items.lock().len(),
            "store opened"
        );
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Store for FileStore {
    fn save_job(&self, job: &Job) -> Result<(), StoreError> {
        self.jobs.write(|jobs| {
            match jobs.iter_mut().find(|j| j.id == job.id) {
                Some(existing) => *existing = job.clone(),
                None => jobs.push(job.clone()),
            }
            Ok(())
        })
    }

    fn get_job(&self, id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.find(|j| j.id == id))
    }

    fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self.jobs.snapshot())
    }

    fn delete_job(&self, id: &str) -> Result<bool, StoreError> {
        self.jobs.write(|jobs| {
            let before = jobs.len();
            jobs.retain(|j| j.id != id);
            Ok(jobs.len() != before)
        })
    }

    fn save_dataset(&self, dataset: &Dataset) -> Result<(), StoreError> {
        self.datasets.write(|datasets| {
            if datasets.iter().any(|d| d.name == dataset.name && d.id != dataset.id) {
                return Err(StoreError::DuplicateDatasetName(dataset.name.clone()));
            }
            match datasets.iter_mut().find(|d| d.id == dataset.id) {
                Some(existing) => *existing = dataset.clone(),
                None => datasets.push(dataset.clone()),
            }
            Ok(())
        })
    }

    fn get_dataset(&self, id: &str) -> Result<Option<Dataset>, StoreError> {
        Ok(self.datasets.find(|d| d.id == id))
    }

    fn list_datasets(&self) -> Result<Vec<Dataset>, StoreError> {
        Ok(self.datasets.snapshot())
    }

    fn insert_model(&self, model: &ModelEntry) -> Result<(), StoreError> {
        self.models.write(|models| {
            if models.iter().any(|m| m.name == model.name && m.version == model.version) {
                return Err(StoreError::DuplicateModel { name: model.name.clone(), version: model.version.clone() });
            }
            models.push(model.clone());
            Ok(())
        })
    }

    fn update_model(&self, model: &ModelEntry) -> Result<(), StoreError> {
        self.models.write(|models| {
            let existing = models
                .iter_mut()
                .find(|m| m.id == model.id)
                .ok_or_else(|| StoreError::NotFound { kind: "model", id: model.id.clone() })?;
            *existing = model.clone();
            Ok(())
        })
    }

    fn get_model(&self, id: &str) -> Result<Option<ModelEntry>, StoreError> {
        Ok(self.models.find(|m| m.id == id))
    }

    fn list_models(&self) -> Result<Vec<ModelEntry>, StoreError> {
        Ok(self.models.snapshot())
    }
}
