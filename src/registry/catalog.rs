use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::image::InputShape;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    #[default]
    Classification,
    Detection,
    Segmentation,
    Prediction,
}

impl ModelType {
    pub fn parse(s: &str) -> Option<ModelType> {
        match s {
            "classification" => Some(ModelType::Classification),
            "detection" => Some(ModelType::Detection),
            "segmentation" => Some(ModelType::Segmentation),
            "prediction" => Some(ModelType::Prediction),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Active,
    Testing,
    Inactive,
    Archived,
}

impl ModelStatus {
    pub fn parse(s: &str) -> Option<ModelStatus> {
        match s {
            "active" => Some(ModelStatus::Active),
            "testing" => Some(ModelStatus::Testing),
            "inactive" => Some(ModelStatus::Inactive),
            "archived" => Some(ModelStatus::Archived),
            _ => None,
        }
    }
}

/// One step of the preprocessing script applied before inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PreprocessingStep {
    Resize { width: usize, height: usize },
    Grayscale,
    Normalize { min: f32, max: f32 },
}

/// `resize(w, h)`, then `grayscale` for single-channel models, then
/// `normalize(0, 1)`.
pub fn preprocessing_for(shape: InputShape) -> Vec<PreprocessingStep> {
    let mut steps = vec![PreprocessingStep::Resize { width: shape.width, height: shape.height }];
    if shape.channels == 1 {
        steps.push(PreprocessingStep::Grayscale);
    }
    steps.push(PreprocessingStep::Normalize { min: 0.0, max: 1.0 });
    steps
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub accuracy: f32,
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainedOn {
    pub dataset_name: String,
    pub dataset_size: usize,
    pub train_date: DateTime<Utc>,
}

/// Catalog record pointing at an artifact directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelEntry {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    pub model_type: ModelType,
    #[serde(default)]
    pub applicable_tags: Vec<String>,
    /// Index = output channel of the stored network.
    pub class_names: Vec<String>,
    pub input_shape: InputShape,
    pub preprocessing: Vec<PreprocessingStep>,
    pub performance: Performance,
    #[serde(default)]
    pub trained_on: Option<TrainedOn>,
    pub artifact_path: PathBuf,
    pub status: ModelStatus,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    pub created_by: String,
    #[serde(default)]
    pub job_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ModelEntry {
    /// Case-insensitive match on name, description or any class name.
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.name.to_lowercase().contains(&needle)
            || self.description.as_deref().is_some_and(|d| d.to_lowercase().contains(&needle))
            || self.class_names.iter().any(|c| c.to_lowercase().contains(&needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grayscale_step_only_for_single_channel() {
        let gray = preprocessing_for(InputShape { width: 32, height: 24, channels: 1 });
        assert_eq!(gray.len(), 3);
        assert_eq!(gray[1], PreprocessingStep::Grayscale);
        let rgb = preprocessing_for(InputShape { width: 32, height: 24, channels: 3 });
        assert_eq!(rgb.len(), 2);
        assert_eq!(rgb[0], PreprocessingStep::Resize { width: 32, height: 24 });
    }

    #[test]
    fn steps_serialize_with_op_tag() {
        let json = serde_json::to_value(PreprocessingStep::Normalize { min: 0.0, max: 1.0 }).unwrap();
        assert_eq!(json["op"], "normalize");
    }

    #[test]
    fn status_parses_wire_names() {
        assert_eq!(ModelStatus::parse("archived"), Some(ModelStatus::Archived));
        assert_eq!(ModelStatus::parse("deleted"), None);
        assert_eq!(ModelType::parse("detection"), Some(ModelType::Detection));
    }
}
