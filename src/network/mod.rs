pub mod artifact;
pub mod error;
pub mod factory;
pub mod metadata;
pub mod network;
pub mod spec;

pub use artifact::{load_artifact, read_metadata, save_artifact, ArtifactFiles, MODEL_FILE, WEIGHTS_FILE};
pub use error::NetworkError;
pub use factory::{
    build_model, check_model_size, topology_for, Architecture, CompiledModel, MAX_PARAMETERS, TRAINING_LEARNING_RATE,
};
pub use metadata::ModelMetadata;
pub use network::Network;
pub use spec::LayerSpec;
