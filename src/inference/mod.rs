pub mod cache;
pub mod prediction;
pub mod runtime;

use thiserror::Error;

use crate::image::ImageError;
use crate::network::NetworkError;
use crate::registry::RegistryError;

pub use cache::{LoadedModel, ModelCache};
pub use prediction::{
    build_prediction, recommendations_for, BatchPrediction, ConfidenceLevel, Explanation, LabelConfidence, Prediction,
};
pub use runtime::{ArtifactPredictor, InferenceService, MockPredictor, Predictor};

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("model {0} not found")]
    ModelNotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("cannot load artifact of model {id}: {source}")]
    ArtifactLoad {
        id: String,
        #[source]
        source: NetworkError,
    },

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("forward pass failed: {0}")]
    Network(#[source] NetworkError),

    #[error(transparent)]
    Registry(RegistryError),
}
