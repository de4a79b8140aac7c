pub mod epoch_stats;
pub mod loop_fn;
pub mod metrics;
pub mod train_config;

use thiserror::Error;

use crate::dataset::DatasetError;
use crate::network::NetworkError;

pub use epoch_stats::{EpochStats, TrainEvent};
pub use loop_fn::{train_loop, Evaluation, TrainOutcome};
pub use metrics::{ConfusionMatrix, MacroScores};
pub use train_config::TrainConfig;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("cancelled")]
    Cancelled,

    #[error("invalid training run: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Network(#[from] NetworkError),
}
