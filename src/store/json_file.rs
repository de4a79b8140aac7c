// Atomic JSON document operations

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use crate::store::StoreError;

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io { path: path.display().to_string(), source }
}

pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let raw = fs::read(path).map_err(|e| io_error(path, e))?;
    serde_json::from_slice(&raw).map_err(|source| StoreError::Corrupt { path: path.display().to_string(), source })
}

/// Writes JSON atomically using write-to-temp-then-rename.
pub fn write_json_file<T: Serialize>(path: &Path, data: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }
    let json = serde_json::to_vec_pretty(data)
        .map_err(|source| StoreError::Corrupt { path: path.display().to_string(), source })?;

    let temp_path = path.with_extension("json.tmp");
    let mut temp_file = File::create(&temp_path).map_err(|e| io_error(&temp_path, e))?;
    temp_file.write_all(&json).map_err(|e| io_error(&temp_path, e))?;
    temp_file.sync_all().map_err(|e| io_error(&temp_path, e))?;
    fs::rename(&temp_path, path).map_err(|e| io_error(path, e))?;
    Ok(())
}

/// Reads `path`, creating it from `default` first when it does not exist.
pub fn read_or_initialize<T: Serialize + DeserializeOwned>(path: &Path, default: T) -> Result<T, StoreError> {
    if !path.exists() {
        write_json_file(path, &default)?;
        return Ok(default);
    }
    read_json_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/doc.json");
        write_json_file(&path, &vec![1, 2, 3]).unwrap();
        let back: Vec<i32> = read_json_file(&path).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn initialize_creates_missing_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let v: Vec<String> = read_or_initialize(&path, Vec::new()).unwrap();
        assert!(v.is_empty());
        assert!(path.exists());
    }

    #[test]
    fn corrupt_document_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        fs::write(&path, b"{not json").unwrap();
        assert!(matches!(read_json_file::<Vec<i32>>(&path), Err(StoreError::Corrupt { .. })));
    }
}
