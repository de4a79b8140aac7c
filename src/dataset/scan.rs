use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use chrono::Utc;

use crate::dataset::loader::{list_images, TRAIN_DIR, VALIDATION_DIR};
use crate::dataset::{ClassEntry, Dataset, DatasetError, DatasetStatus, ImagingKind};

fn class_dirs(split_dir: &Path) -> Result<Vec<String>, DatasetError> {
    let entries = match fs::read_dir(split_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(DatasetError::Io { path: split_dir.display().to_string(), source }),
    };
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| DatasetError::Io { path: split_dir.display().to_string(), source })?;
        if entry.path().is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

/// Builds a `Dataset` record from what is on disk under `root`.
///
/// Classes are the union of the class directories of both splits, sorted by
/// name. The record is `ready` once at least one class directory exists;
/// emptiness of the class directories is reported by the loader at training
/// time.
pub fn scan_dataset(root: &Path, id: &str, name: &str, kind: ImagingKind) -> Result<Dataset, DatasetError> {
    let mut names = BTreeSet::new();
    names.extend(class_dirs(&root.join(TRAIN_DIR))?);
    names.extend(class_dirs(&root.join(VALIDATION_DIR))?);

    let mut classes = Vec::with_capacity(names.len());
    let (mut train_samples, mut val_samples) = (0, 0);
    for class in names {
        let train = list_images(&root.join(TRAIN_DIR).join(&class))?.len();
        let val = list_images(&root.join(VALIDATION_DIR).join(&class))?.len();
        train_samples += train;
        val_samples += val;
        classes.push(ClassEntry { name: class, sample_count: train + val });
    }
    let total_samples = train_samples + val_samples;
    let now = Utc::now();
    let status = if classes.is_empty() { DatasetStatus::Error } else { DatasetStatus::Ready };

    Ok(Dataset {
        id: id.to_string(),
        name: name.to_string(),
        kind,
        classes,
        total_samples,
        train_samples,
        val_samples,
        root_path: root.to_path_buf(),
        status,
        created_at: now,
        updated_at: now,
    })
}
