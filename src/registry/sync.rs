use std::collections::HashSet;
use std::fs;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::network::{read_metadata, MODEL_FILE};
use crate::registry::{preprocessing_for, ModelEntry, ModelStatus, Performance, Registry, RegistryError};

/// Outcome of reconciling the catalog with the artifact tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    /// Catalog ids whose artifact is gone; now `inactive`.
    pub missing: Vec<String>,
    /// Catalog ids created for artifacts that had no entry.
    pub recovered: Vec<String>,
    /// Artifact directories whose name and version are taken by another entry.
    pub conflicting: Vec<String>,
    /// Artifact directories without a readable `model.json`.
    pub unreadable: Vec<String>,
}

impl Registry {
    /// Marks entries with a missing artifact `inactive` and registers orphan
    /// artifacts as `inactive` entries. Artifacts written by a job that has
    /// not finished yet are left alone.
    pub fn sync(&self) -> Result<SyncReport, RegistryError> {
        let _guard = self.edit_lock.lock();
        let mut report = SyncReport::default();
        let mut entries = self.store.list_models()?;

        for entry in &mut entries {
            if entry.artifact_path.join(MODEL_FILE).is_file() {
                continue;
            }
            report.missing.push(entry.id.clone());
            if entry.status != ModelStatus::Inactive {
                entry.status = ModelStatus::Inactive;
                entry.updated_at = Utc::now();
                self.store.update_model(entry)?;
            }
        }

        let known: HashSet<_> = entries.iter().map(|e| e.artifact_path.clone()).collect();
        let dir_entries = match fs::read_dir(self.models_dir()) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
            Err(source) => {
                return Err(RegistryError::Io { path: self.models_dir().display().to_string(), source })
            }
        };
        let mut dirs: Vec<_> = dir_entries.filter_map(|e| e.ok()).map(|e| e.path()).filter(|p| p.is_dir()).collect();
        dirs.sort();

        for dir in dirs {
            if known.contains(&dir) {
                continue;
            }
            let label = dir.display().to_string();
            let metadata = match read_metadata(&dir) {
                Ok(m) => m,
                Err(e) => {
                    warn!(dir = %label, error = %e, "skipping unreadable artifact");
                    report.unreadable.push(label);
                    continue;
                }
            };
            if let Some(job_id) = &metadata.job_id {
                // its job is still running and will register the artifact itself
                if self.store.get_job(job_id)?.is_some_and(|j| !j.status.is_terminal()) {
                    debug!(dir = %label, job_id = %job_id, "skipping artifact of a running job");
                    continue;
                }
            }
            if entries.iter().any(|e| e.name == metadata.name && e.version == metadata.version) {
                report.conflicting.push(label);
                continue;
            }
            let now = Utc::now();
            let entry = ModelEntry {
                id: Uuid::new_v4().to_string(),
                name: metadata.name,
                version: metadata.version,
                description: metadata.description,
                model_type: Default::default(),
                applicable_tags: Vec::new(),
                class_names: metadata.class_names,
                input_shape: metadata.input_shape,
                preprocessing: preprocessing_for(metadata.input_shape),
                performance: Performance::default(),
                trained_on: None,
                artifact_path: dir,
                status: ModelStatus::Inactive,
                usage_count: 0,
                last_used: None,
                created_by: "sync".into(),
                job_id: metadata.job_id,
                created_at: now,
                updated_at: now,
            };
            self.store.insert_model(&entry)?;
            report.recovered.push(entry.id.clone());
            entries.push(entry);
        }

        info!(
            missing = report.missing.len(),
            recovered = report.recovered.len(),
            conflicting = report.conflicting.len(),
            "catalog synced"
        );
        Ok(report)
    }
}
