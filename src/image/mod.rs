pub mod pipeline;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use pipeline::{load_batch, load_image_file, preprocess_bytes};

/// Target geometry a model consumes, `{width, height, channels}` with
/// `channels ∈ {1, 3}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputShape {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
}

impl InputShape {
    /// Per-item NHWC dimensions `[h, w, c]`.
    pub fn dims(&self) -> [usize; 3] {
        [self.height, self.width, self.channels]
    }

    pub fn values_per_image(&self) -> usize {
        self.width * self.height * self.channels
    }
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("cannot decode image {path}: {message}")]
    Decode { path: String, message: String },

    #[error("cannot read image {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported channel count {0}, expected 1 or 3")]
    Channels(usize),

    #[error("image target size {width}x{height} is empty")]
    EmptyTarget { width: usize, height: usize },
}
