use thiserror::Error;

use crate::dataset::DatasetError;
use crate::image::ImageError;
use crate::inference::InferenceError;
use crate::job::JobError;
use crate::network::NetworkError;
use crate::registry::RegistryError;
use crate::store::StoreError;
use crate::train::TrainError;

pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level error every public operation converges on. `kind()` is the
/// stable tag shown to API clients.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Train(#[from] TrainError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),
}

impl Error {
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Job(e) => match e {
                JobError::Validation(_) => "ValidationError",
                JobError::DatasetNotFound(_) => "DatasetNotFound",
                JobError::DatasetNotReady { .. } => "DatasetNotReady",
                JobError::NotFound(_) => "JobNotFound",
                JobError::Conflict(_) | JobError::InvalidTransition { .. } => "Conflict",
                JobError::Thread(_) => "Internal",
                JobError::Store(s) => store_kind(s),
            },
            Error::Registry(e) => registry_kind(e),
            Error::Inference(e) => match e {
                InferenceError::ModelNotFound(_) => "ModelNotFound",
                InferenceError::Validation(_) => "ValidationError",
                InferenceError::ArtifactLoad { .. } => "ArtifactLoadError",
                InferenceError::Image(ImageError::Channels(_) | ImageError::EmptyTarget { .. }) => "ValidationError",
                InferenceError::Image(_) => "DecodeError",
                InferenceError::Network(_) => "Internal",
                InferenceError::Registry(r) => registry_kind(r),
            },
            Error::Dataset(e) => dataset_kind(e),
            Error::Store(s) => store_kind(s),
            Error::Train(e) => match e {
                TrainError::Cancelled => "Cancelled",
                TrainError::InvalidConfig(_) => "ValidationError",
                TrainError::Dataset(d) => dataset_kind(d),
                TrainError::Network(n) => network_kind(n),
            },
            Error::Network(e) => network_kind(e),
            Error::Validation(_) => "ValidationError",
            Error::Unauthorized(_) => "Unauthorized",
            Error::NotFound(_) => "NotFound",
        }
    }

    /// Whether the message is safe to show a client as-is.
    pub fn is_internal(&self) -> bool {
        self.kind() == "Internal" || self.kind() == "StoreWriteError"
    }
}

fn dataset_kind(e: &DatasetError) -> &'static str {
    match e {
        DatasetError::Empty(_) | DatasetError::NoDecodableSamples => "EmptyDatasetError",
        DatasetError::NoClasses => "ValidationError",
        DatasetError::Io { .. } | DatasetError::Tensor(_) => "Internal",
    }
}

fn network_kind(e: &NetworkError) -> &'static str {
    match e {
        NetworkError::InvalidArchitecture(_) => "ValidationError",
        _ => "Internal",
    }
}

fn registry_kind(e: &RegistryError) -> &'static str {
    match e {
        RegistryError::NotFound(_) => "ModelNotFound",
        RegistryError::AlreadyRegistered { .. } => "ModelAlreadyRegistered",
        RegistryError::Validation(_) => "ValidationError",
        RegistryError::Artifact(_) | RegistryError::Io { .. } => "Internal",
        RegistryError::Store(s) => store_kind(s),
    }
}

fn store_kind(e: &StoreError) -> &'static str {
    match e {
        StoreError::DuplicateModel { .. } => "ModelAlreadyRegistered",
        StoreError::DuplicateDatasetName(_) => "ValidationError",
        StoreError::NotFound { .. } => "NotFound",
        StoreError::Io { .. } | StoreError::Corrupt { .. } => "StoreWriteError",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable_tags() {
        assert_eq!(Error::from(JobError::Validation("x".into())).kind(), "ValidationError");
        assert_eq!(
            Error::from(JobError::DatasetNotReady { id: "d".into(), status: "error".into() }).kind(),
            "DatasetNotReady"
        );
        assert_eq!(
            Error::from(RegistryError::AlreadyRegistered { name: "x".into(), version: "1".into() }).kind(),
            "ModelAlreadyRegistered"
        );
        assert_eq!(Error::from(InferenceError::ModelNotFound("m".into())).kind(), "ModelNotFound");
        assert_eq!(Error::Unauthorized("no token".into()).kind(), "Unauthorized");
    }

    #[test]
    fn training_failures_map_to_job_kinds() {
        assert_eq!(Error::from(TrainError::Cancelled).kind(), "Cancelled");
        assert_eq!(Error::from(DatasetError::Empty("root".into())).kind(), "EmptyDatasetError");
        assert_eq!(
            Error::from(TrainError::Network(NetworkError::InvalidArchitecture("too small".into()))).kind(),
            "ValidationError"
        );
    }

    #[test]
    fn store_failures_are_internal() {
        let e = Error::from(StoreError::Io {
            path: "jobs.json".into(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        });
        assert_eq!(e.kind(), "StoreWriteError");
        assert!(e.is_internal());
    }
}
