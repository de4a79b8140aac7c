use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::image::InputShape;
use crate::job::JobError;
use crate::network::Architecture;
use crate::registry::ModelType;
use crate::train::EpochStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Preparing,
    Training,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Preparing => "preparing",
            JobStatus::Training => "training",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// ```text
    /// pending → preparing → training → completed
    ///    │          │           │
    ///    └──────────┴───────────┴──→ failed
    /// ```
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Preparing) | (Preparing, Training) | (Training, Completed) | (Pending | Preparing | Training, Failed)
        )
    }

    pub fn parse(s: &str) -> Option<JobStatus> {
        [JobStatus::Pending, JobStatus::Preparing, JobStatus::Training, JobStatus::Completed, JobStatus::Failed]
            .into_iter()
            .find(|st| st.as_str() == s)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the job should produce and register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelTarget {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    pub model_type: ModelType,
    pub architecture: Architecture,
    pub input_shape: InputShape,
    #[serde(default)]
    pub applicable_tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingParams {
    pub epochs: usize,
    pub batch_size: usize,
    pub validation_split: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub current_epoch: usize,
    pub total_epochs: usize,
    pub train_loss: Option<f32>,
    pub train_acc: Option<f32>,
    pub val_loss: Option<f32>,
    pub val_acc: Option<f32>,
    pub evaluation_loss: Option<f32>,
    pub evaluation_accuracy: Option<f32>,
    /// Every completed epoch in order.
    #[serde(default)]
    pub history: Vec<EpochStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub submitted_by: String,
    pub dataset_id: String,
    pub target: ModelTarget,
    pub config: TrainingParams,
    pub status: JobStatus,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    /// Stable error tag of the failure (`Cancelled`, `Interrupted`, ...).
    #[serde(default)]
    pub failure_kind: Option<String>,
    pub progress: JobProgress,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub model_ref: Option<String>,
}

impl Job {
    /// Moves to `next`, maintaining `startedAt`/`completedAt`.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), JobError> {
        if !self.status.can_transition_to(next) {
            return Err(JobError::InvalidTransition { from: self.status, to: next });
        }
        let now = Utc::now();
        if next == JobStatus::Preparing {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        self.status = next;
        self.status_message = Some(default_message(next).to_string());
        Ok(())
    }

    pub fn fail(&mut self, kind: &str, reason: impl Into<String>) -> Result<(), JobError> {
        self.transition(JobStatus::Failed)?;
        let reason = reason.into();
        self.status_message = Some(format!("failed: {reason}"));
        self.failure_reason = Some(reason);
        self.failure_kind = Some(kind.to_string());
        Ok(())
    }

    pub fn complete(&mut self, model_id: &str) -> Result<(), JobError> {
        self.transition(JobStatus::Completed)?;
        self.model_ref = Some(model_id.to_string());
        Ok(())
    }

    /// Records the start of `epoch`. Earlier epochs are ignored so progress
    /// never moves backwards.
    pub fn epoch_started(&mut self, epoch: usize, total_epochs: usize) {
        if epoch < self.progress.current_epoch || epoch > total_epochs {
            return;
        }
        self.progress.current_epoch = epoch;
        self.progress.total_epochs = total_epochs;
        self.status_message = Some(format!("training epoch {epoch}/{total_epochs}"));
    }

    pub fn epoch_completed(&mut self, stats: EpochStats) {
        if stats.epoch < self.progress.current_epoch || stats.epoch > stats.total_epochs {
            return;
        }
        if self.progress.history.last().is_some_and(|last| last.epoch >= stats.epoch) {
            return;
        }
        let p = &mut self.progress;
        p.current_epoch = stats.epoch;
        p.total_epochs = stats.total_epochs;
        p.train_loss = Some(stats.train_loss);
        p.train_acc = Some(stats.train_acc);
        p.val_loss = stats.val_loss;
        p.val_acc = stats.val_acc;
        p.history.push(stats);
    }
}

fn default_message(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "queued",
        JobStatus::Preparing => "loading dataset and building model",
        JobStatus::Training => "training",
        JobStatus::Completed => "model registered",
        JobStatus::Failed => "failed",
    }
}

/// Seed for everything random in a job: the first 8 bytes of SHA-256 of the
/// job id, big-endian.
pub fn job_seed(job_id: &str) -> u64 {
    let digest = Sha256::digest(job_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> Job {
        Job {
            id: "j1".into(),
            name: "chest".into(),
            description: None,
            submitted_by: "alice".into(),
            dataset_id: "d1".into(),
            target: ModelTarget {
                name: "m".into(),
                version: "1.0".into(),
                description: None,
                model_type: ModelType::Classification,
                architecture: Architecture::Simple,
                input_shape: InputShape { width: 8, height: 8, channels: 1 },
                applicable_tags: vec![],
            },
            config: TrainingParams { epochs: 2, batch_size: 4, validation_split: 0.2 },
            status: JobStatus::Pending,
            status_message: None,
            failure_reason: None,
            failure_kind: None,
            progress: JobProgress::default(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            model_ref: None,
        }
    }

    fn stats(epoch: usize) -> EpochStats {
        EpochStats {
            epoch,
            total_epochs: 2,
            train_loss: 1.0,
            train_acc: 0.5,
            val_loss: None,
            val_acc: None,
            elapsed_ms: 1,
        }
    }

    #[test]
    fn happy_path_transitions() {
        let mut job = sample_job();
        job.transition(JobStatus::Preparing).unwrap();
        assert!(job.started_at.is_some());
        job.transition(JobStatus::Training).unwrap();
        assert!(job.completed_at.is_none());
        job.complete("model-1").unwrap();
        assert!(job.completed_at.is_some());
        assert_eq!(job.model_ref.as_deref(), Some("model-1"));
    }

    #[test]
    fn terminal_states_are_final() {
        let mut job = sample_job();
        job.fail("Cancelled", "cancelled by user").unwrap();
        assert!(job.completed_at.is_some());
        assert!(job.transition(JobStatus::Preparing).is_err());
        assert!(job.fail("Internal", "again").is_err());
        assert_eq!(job.failure_kind.as_deref(), Some("Cancelled"));
        assert_eq!(job.failure_reason.as_deref(), Some("cancelled by user"));
    }

    #[test]
    fn cannot_skip_preparing() {
        let mut job = sample_job();
        assert!(matches!(
            job.transition(JobStatus::Training),
            Err(JobError::InvalidTransition { from: JobStatus::Pending, to: JobStatus::Training })
        ));
        assert!(job.complete("m").is_err());
    }

    #[test]
    fn progress_never_moves_backwards() {
        let mut job = sample_job();
        job.epoch_completed(stats(2));
        job.epoch_completed(stats(1));
        job.epoch_started(1, 2);
        assert_eq!(job.progress.current_epoch, 2);
        assert_eq!(job.progress.history.len(), 1);
        job.epoch_started(3, 2);
        assert_eq!(job.progress.current_epoch, 2);
    }

    #[test]
    fn seed_is_stable_per_id() {
        assert_eq!(job_seed("abc"), job_seed("abc"));
        assert_ne!(job_seed("abc"), job_seed("abd"));
        // SHA-256("abc") starts with ba7816bf8f01cfea
        assert_eq!(job_seed("abc"), 0xba78_16bf_8f01_cfea);
    }

    #[test]
    fn status_parses_wire_names() {
        assert_eq!(JobStatus::parse("training"), Some(JobStatus::Training));
        assert_eq!(JobStatus::parse("cancelled"), None);
    }
}
