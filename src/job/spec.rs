use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::image::InputShape;
use crate::job::{Job, JobError, JobProgress, JobStatus, ModelTarget, TrainingParams};
use crate::network::Architecture;
use crate::registry::ModelType;

pub const EPOCHS_RANGE: (usize, usize) = (1, 100);
pub const BATCH_SIZE_RANGE: (usize, usize) = (1, 256);
pub const VALIDATION_SPLIT_RANGE: (f32, f32) = (0.1, 0.5);
pub const MAX_IMAGE_SIDE: usize = 1024;

/// A training job submission as sent by the web layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub dataset_id: String,
    #[serde(default)]
    pub model_type: ModelType,
    pub model_name: String,
    pub model_version: String,
    #[serde(default)]
    pub model_description: Option<String>,
    pub model_architecture: Architecture,
    pub input_shape: InputShape,
    #[serde(default)]
    pub applicable_body_parts: Vec<String>,
    pub epochs: usize,
    pub batch_size: usize,
    pub validation_split: f32,
}

fn check_range<T: PartialOrd + std::fmt::Display>(field: &str, value: T, (lo, hi): (T, T)) -> Result<(), JobError> {
    if value >= lo && value <= hi {
        Ok(())
    } else {
        Err(JobError::Validation(format!("{field} must be in [{lo}, {hi}], got {value}")))
    }
}

impl JobSpec {
    pub fn validate(&self) -> Result<(), JobError> {
        for (field, value) in [
            ("name", &self.name),
            ("datasetId", &self.dataset_id),
            ("modelName", &self.model_name),
            ("modelVersion", &self.model_version),
        ] {
            if value.trim().is_empty() {
                return Err(JobError::Validation(format!("{field} must not be empty")));
            }
        }
        check_range("epochs", self.epochs, EPOCHS_RANGE)?;
        check_range("batchSize", self.batch_size, BATCH_SIZE_RANGE)?;
        // NaN fails both comparisons and is rejected here.
        check_range("validationSplit", self.validation_split, VALIDATION_SPLIT_RANGE)?;
        if !matches!(self.input_shape.channels, 1 | 3) {
            return Err(JobError::Validation(format!(
                "inputShape.channels must be 1 or 3, got {}",
                self.input_shape.channels
            )));
        }
        check_range("inputShape.width", self.input_shape.width, (1, MAX_IMAGE_SIDE))?;
        check_range("inputShape.height", self.input_shape.height, (1, MAX_IMAGE_SIDE))?;
        Ok(())
    }

    /// Builds the `pending` job record for this submission.
    pub fn into_job(self, id: String, submitted_by: String) -> Job {
        Job {
            id,
            name: self.name,
            description: self.description,
            submitted_by,
            dataset_id: self.dataset_id,
            target: ModelTarget {
                name: self.model_name,
                version: self.model_version,
                description: self.model_description,
                model_type: self.model_type,
                architecture: self.model_architecture,
                input_shape: self.input_shape,
                applicable_tags: self.applicable_body_parts,
            },
            config: TrainingParams {
                epochs: self.epochs,
                batch_size: self.batch_size,
                validation_split: self.validation_split,
            },
            status: JobStatus::Pending,
            status_message: Some("queued".into()),
            failure_reason: None,
            failure_kind: None,
            progress: JobProgress { total_epochs: self.epochs, ..JobProgress::default() },
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            model_ref: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> JobSpec {
        serde_json::from_value(serde_json::json!({
            "name": "chest",
            "datasetId": "d1",
            "modelName": "m",
            "modelVersion": "1.0",
            "modelArchitecture": "simple",
            "inputShape": {"width": 16, "height": 16, "channels": 3},
            "epochs": 2,
            "batchSize": 4,
            "validationSplit": 0.2
        }))
        .unwrap()
    }

    #[test]
    fn split_bounds_are_inclusive() {
        for ok in [0.1, 0.5] {
            let mut s = spec();
            s.validation_split = ok;
            assert!(s.validate().is_ok(), "{ok} should be accepted");
        }
        for bad in [0.09, 0.51, f32::NAN] {
            let mut s = spec();
            s.validation_split = bad;
            assert!(matches!(s.validate(), Err(JobError::Validation(_))), "{bad} should be rejected");
        }
    }

    #[test]
    fn epochs_and_batch_size_are_bounded() {
        let mut s = spec();
        s.epochs = 0;
        assert!(s.validate().is_err());
        s.epochs = 101;
        assert!(s.validate().is_err());
        s.epochs = 100;
        s.batch_size = 257;
        assert!(s.validate().is_err());
    }

    #[test]
    fn channels_must_be_one_or_three() {
        let mut s = spec();
        s.input_shape.channels = 2;
        assert!(s.validate().is_err());
    }

    #[test]
    fn blank_names_are_rejected() {
        let mut s = spec();
        s.model_version = "  ".into();
        assert!(s.validate().is_err());
    }

    #[test]
    fn new_job_is_pending_with_total_epochs() {
        let job = spec().into_job("id".into(), "bob".into());
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress.total_epochs, 2);
        assert_eq!(job.progress.current_epoch, 0);
        assert_eq!(job.submitted_by, "bob");
        assert_eq!(job.target.model_type, ModelType::Classification);
    }
}
