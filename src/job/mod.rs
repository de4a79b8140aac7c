pub mod model;
pub mod orchestrator;
pub mod recovery;
pub mod spec;
mod worker;

use thiserror::Error;

use crate::store::StoreError;

pub use model::{job_seed, Job, JobProgress, JobStatus, ModelTarget, TrainingParams};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use recovery::{recover_interrupted, RESTART_REASON};
pub use spec::JobSpec;

pub const CANCELLED_REASON: &str = "cancelled";
pub const CANCELLED_BY_USER_REASON: &str = "cancelled by user";

#[derive(Debug, Error)]
pub enum JobError {
    #[error("{0}")]
    Validation(String),

    #[error("dataset {0} not found")]
    DatasetNotFound(String),

    #[error("dataset {id} is not ready (status {status})")]
    DatasetNotReady { id: String, status: String },

    #[error("job {0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("job cannot move from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("cannot start thread: {0}")]
    Thread(#[source] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}
