use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::math::argmax;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    #[serde(rename = "very high")]
    VeryHigh,
    #[serde(rename = "high")]
    High,
    #[serde(rename = "moderate")]
    Moderate,
    #[serde(rename = "low")]
    Low,
}

impl ConfidenceLevel {
    /// `confidence` is a percentage.
    pub fn of(confidence: f32) -> ConfidenceLevel {
        if confidence > 90.0 {
            ConfidenceLevel::VeryHigh
        } else if confidence > 75.0 {
            ConfidenceLevel::High
        } else if confidence > 50.0 {
            ConfidenceLevel::Moderate
        } else {
            ConfidenceLevel::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceLevel::VeryHigh => "very high",
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Moderate => "moderate",
            ConfidenceLevel::Low => "low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelConfidence {
    pub label: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Explanation {
    pub summary: String,
    pub confidence_level: ConfidenceLevel,
    pub details: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub condition: String,
    /// Percentage in [0, 100].
    pub confidence: f32,
    /// Every class, highest confidence first.
    pub all_predictions: Vec<LabelConfidence>,
    pub explanation: Explanation,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPrediction {
    pub predictions: Vec<Prediction>,
    pub primary_index: usize,
    pub primary_diagnosis: Prediction,
}

const RECOMMENDATIONS: &[(&str, &[&str])] = &[
    ("normal", &["No follow-up indicated by this result.", "Continue routine review schedule."]),
    ("abnormal", &["Refer for specialist review.", "Compare with prior studies if available."]),
    ("pneumonia", &["Correlate with clinical findings.", "Consider a follow-up study after treatment."]),
    ("tuberculosis", &["Confirm with laboratory testing.", "Refer for specialist review."]),
    ("fracture", &["Confirm with an additional view.", "Refer for specialist review."]),
    ("tumor", &["Refer for specialist review.", "Consider additional imaging for characterisation."]),
];

/// Follow-up suggestions for a predicted label; empty when the label is unknown.
pub fn recommendations_for(label: &str) -> Vec<String> {
    RECOMMENDATIONS
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(label))
        .map(|(_, recs)| recs.iter().map(|r| r.to_string()).collect())
        .unwrap_or_default()
}

/// Turns per-class probabilities (summing to 1) into a ranked prediction.
///
/// `class_names` and `probabilities` must have the same length and at least
/// one element.
pub fn build_prediction(class_names: &[String], probabilities: &[f32], model_label: &str) -> Prediction {
    let top = argmax(probabilities);
    let condition = class_names.get(top).cloned().unwrap_or_default();
    let confidence = probabilities.get(top).copied().unwrap_or(0.0) * 100.0;

    let mut all_predictions: Vec<LabelConfidence> = class_names
        .iter()
        .zip(probabilities)
        .map(|(label, p)| LabelConfidence { label: label.clone(), confidence: p * 100.0 })
        .collect();
    all_predictions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let level = ConfidenceLevel::of(confidence);
    let mut details = vec![format!("Model {model_label} scored {} classes.", class_names.len())];
    if let Some(runner_up) = all_predictions.get(1) {
        details.push(format!("Next most likely: {} ({:.1}%).", runner_up.label, runner_up.confidence));
    }
    let explanation = Explanation {
        summary: format!("{condition} with {} confidence ({confidence:.1}%).", level.as_str()),
        confidence_level: level,
        details,
        recommendations: recommendations_for(&condition),
    };

    Prediction { condition, confidence, all_predictions, explanation, timestamp: Utc::now() }
}

/// Picks the highest-confidence prediction as primary; the first wins ties.
pub fn primary_of(predictions: Vec<Prediction>) -> Option<BatchPrediction> {
    let mut primary_index = 0;
    for (i, p) in predictions.iter().enumerate() {
        if p.confidence > predictions[primary_index].confidence {
            primary_index = i;
        }
    }
    let primary_diagnosis = predictions.get(primary_index)?.clone();
    Some(BatchPrediction { predictions, primary_index, primary_diagnosis })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["normal".into(), "pneumonia".into(), "other".into()]
    }

    #[test]
    fn confidence_thresholds_are_exclusive() {
        assert_eq!(ConfidenceLevel::of(90.5), ConfidenceLevel::VeryHigh);
        assert_eq!(ConfidenceLevel::of(90.0), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::of(75.0), ConfidenceLevel::Moderate);
        assert_eq!(ConfidenceLevel::of(50.0), ConfidenceLevel::Low);
    }

    #[test]
    fn ranks_classes_and_maps_top_label() {
        let p = build_prediction(&names(), &[0.2, 0.7, 0.1], "m@1");
        assert_eq!(p.condition, "pneumonia");
        assert!((p.confidence - 70.0).abs() < 1e-4);
        assert_eq!(p.all_predictions[0].label, "pneumonia");
        assert_eq!(p.all_predictions[2].label, "other");
        assert_eq!(p.explanation.confidence_level, ConfidenceLevel::Moderate);
        assert!(!p.explanation.recommendations.is_empty());
    }

    #[test]
    fn unknown_labels_have_no_recommendations() {
        assert!(recommendations_for("other").is_empty());
        assert_eq!(recommendations_for("NORMAL").len(), 2);
    }

    #[test]
    fn primary_is_highest_confidence() {
        let a = build_prediction(&names(), &[0.6, 0.3, 0.1], "m");
        let b = build_prediction(&names(), &[0.1, 0.85, 0.05], "m");
        let c = build_prediction(&names(), &[0.4, 0.4, 0.2], "m");
        let batch = primary_of(vec![a, b, c]).unwrap();
        assert_eq!(batch.primary_index, 1);
        assert_eq!(batch.primary_diagnosis.condition, "pneumonia");
        assert_eq!(batch.predictions.len(), 3);
        assert!(primary_of(Vec::new()).is_none());
    }

    #[test]
    fn level_serializes_with_spaces() {
        assert_eq!(serde_json::to_value(ConfidenceLevel::VeryHigh).unwrap(), "very high");
    }
}
