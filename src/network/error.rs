use thiserror::Error;

use crate::math::TensorError;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("{layer} received input of shape {got:?}, expected {expected:?}")]
    InputShape { layer: &'static str, expected: Vec<usize>, got: Vec<usize> },

    #[error("{0}: backward called without a cached forward pass")]
    MissingForward(&'static str),

    #[error("invalid architecture: {0}")]
    InvalidArchitecture(String),

    #[error("artifact error: {0}")]
    Artifact(String),

    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
