pub mod batches;
pub mod loader;
pub mod model;
pub mod scan;

use thiserror::Error;

use crate::math::TensorError;

pub use batches::{Batch, BatchSource, ImageBatches, Split};
pub use loader::{prepare_split, Sample, SplitSamples};
pub use model::{ClassEntry, Dataset, DatasetStatus, ImagingKind};
pub use scan::scan_dataset;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset is empty: no jpg/jpeg/png images under {0}")]
    Empty(String),

    #[error("dataset lists no classes")]
    NoClasses,

    #[error("no training image could be decoded")]
    NoDecodableSamples,

    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Tensor(#[from] TensorError),
}
