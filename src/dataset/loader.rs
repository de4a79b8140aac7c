use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::dataset::DatasetError;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub const TRAIN_DIR: &str = "train";
pub const VALIDATION_DIR: &str = "validation";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub path: PathBuf,
    pub label: usize,
}

/// Shuffled, labeled samples ready for batching.
#[derive(Debug, Clone)]
pub struct SplitSamples {
    pub classes: Vec<String>,
    pub train: Vec<Sample>,
    pub validation: Vec<Sample>,
}

pub(crate) fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

/// Image files directly inside `dir`, sorted by path. A missing directory is
/// treated as empty.
pub(crate) fn list_images(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(DatasetError::Io { path: dir.display().to_string(), source }),
    };
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| DatasetError::Io { path: dir.display().to_string(), source })?;
        let path = entry.path();
        if path.is_file() && is_image(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn collect_split(root: &Path, split: &str, classes: &[String]) -> Result<Vec<Sample>, DatasetError> {
    let mut samples = Vec::new();
    for (label, class) in classes.iter().enumerate() {
        for path in list_images(&root.join(split).join(class))? {
            samples.push(Sample { path, label });
        }
    }
    Ok(samples)
}

/// Indexes `root` for `classes`, shuffles with `seed` and applies the split.
///
/// When both `train/` and `validation/` hold images they are used as-is.
/// Otherwise every image is pooled and cut at `floor(N · (1 − validation_split))`,
/// keeping at least one training sample.
pub fn prepare_split(
    root: &Path,
    classes: &[String],
    validation_split: f32,
    seed: u64,
) -> Result<SplitSamples, DatasetError> {
    if classes.is_empty() {
        return Err(DatasetError::NoClasses);
    }
    let mut train = collect_split(root, TRAIN_DIR, classes)?;
    let mut validation = collect_split(root, VALIDATION_DIR, classes)?;
    if train.is_empty() && validation.is_empty() {
        return Err(DatasetError::Empty(root.display().to_string()));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    if !train.is_empty() && !validation.is_empty() {
        train.shuffle(&mut rng);
        validation.shuffle(&mut rng);
    } else {
        let mut pool = train;
        pool.append(&mut validation);
        pool.shuffle(&mut rng);
        let n = pool.len();
        let cut = ((n as f64 * (1.0 - validation_split as f64)).floor() as usize).clamp(1, n);
        validation = pool.split_off(cut);
        train = pool;
    }
    debug!(train = train.len(), validation = validation.len(), "dataset split prepared");

    Ok(SplitSamples { classes: classes.to_vec(), train, validation })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, split: &str, class: &str, name: &str) {
        let dir = root.join(split).join(class);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), b"x").unwrap();
    }

    fn classes() -> Vec<String> {
        vec!["normal".into(), "pneumonia".into()]
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        assert!(is_image(Path::new("a.JPG")));
        assert!(is_image(Path::new("a.Png")));
        assert!(!is_image(Path::new("a.gif")));
        assert!(!is_image(Path::new("jpg")));
    }

    #[test]
    fn empty_tree_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("train/normal")).unwrap();
        let err = prepare_split(dir.path(), &classes(), 0.2, 1).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn populated_validation_is_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..4 {
            touch(dir.path(), "train", "normal", &format!("{i}.png"));
            touch(dir.path(), "train", "pneumonia", &format!("{i}.jpg"));
        }
        touch(dir.path(), "validation", "pneumonia", "v.jpeg");
        let split = prepare_split(dir.path(), &classes(), 0.5, 1).unwrap();
        assert_eq!(split.train.len(), 8);
        assert_eq!(split.validation.len(), 1);
        assert_eq!(split.validation[0].label, 1);
    }

    #[test]
    fn split_boundary_is_floored() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..7 {
            touch(dir.path(), "train", "normal", &format!("{i}.png"));
        }
        let split = prepare_split(dir.path(), &classes(), 0.2, 1).unwrap();
        // floor(7 · 0.8) = 5
        assert_eq!(split.train.len(), 5);
        assert_eq!(split.validation.len(), 2);
    }

    #[test]
    fn same_seed_same_order() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..10 {
            touch(dir.path(), "train", "normal", &format!("{i}.png"));
        }
        let a = prepare_split(dir.path(), &classes(), 0.3, 42).unwrap();
        let b = prepare_split(dir.path(), &classes(), 0.3, 42).unwrap();
        assert_eq!(a.train, b.train);
        assert_eq!(a.validation, b.validation);
    }

    #[test]
    fn single_image_keeps_one_training_sample() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "train", "normal", "only.png");
        let split = prepare_split(dir.path(), &classes(), 0.5, 1).unwrap();
        assert_eq!(split.train.len(), 1);
        assert!(split.validation.is_empty());
    }
}
