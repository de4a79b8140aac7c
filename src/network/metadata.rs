use serde::{Deserialize, Serialize};

use crate::image::InputShape;

/// Annotations stored alongside a trained artifact so the artifact alone is
/// enough to rebuild its catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub name: String,
    pub version: String,
    /// Human-readable class labels, index = output channel.
    pub class_names: Vec<String>,
    pub input_shape: InputShape,
    /// Training job that produced the artifact, if any.
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}
