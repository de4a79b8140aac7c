use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use crate::image::preprocess_bytes;
use crate::inference::cache::ModelCache;
use crate::inference::prediction::{build_prediction, primary_of, BatchPrediction, Prediction};
use crate::inference::InferenceError;
use crate::registry::{ModelEntry, ModelStatus, Registry, RegistryError};

/// How class probabilities are produced for an image. Chosen once at startup.
pub trait Predictor: Send + Sync {
    /// Probabilities over `entry.class_names`, summing to 1.
    fn probabilities(&self, entry: &ModelEntry, image: &[u8]) -> Result<Vec<f32>, InferenceError>;

    /// Releases any cached model memory.
    fn clear_cache(&self) {}

    /// Releases one cached model.
    fn evict(&self, _model_id: &str) {}

    fn cached_models(&self) -> usize {
        0
    }
}

/// Runs the stored network of the catalog entry.
#[derive(Default)]
pub struct ArtifactPredictor {
    cache: ModelCache,
}

impl ArtifactPredictor {
    pub fn new() -> ArtifactPredictor {
        ArtifactPredictor::default()
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }
}

impl Predictor for ArtifactPredictor {
    fn probabilities(&self, entry: &ModelEntry, image: &[u8]) -> Result<Vec<f32>, InferenceError> {
        let model = self
            .cache
            .get_or_load(&entry.id, &entry.artifact_path)
            .map_err(|source| InferenceError::ArtifactLoad { id: entry.id.clone(), source })?;
        if model.metadata.class_names.len() != entry.class_names.len() {
            return Err(InferenceError::Validation(format!(
                "catalog entry {} lists {} classes but its artifact has {}",
                entry.id,
                entry.class_names.len(),
                model.metadata.class_names.len()
            )));
        }
        let input = preprocess_bytes(image, model.network.lock().input_shape, "uploaded image")?;
        let output = model.network.lock().predict(&input).map_err(InferenceError::Network)?;
        Ok(output.item(0).to_vec())
    }

    fn clear_cache(&self) {
        self.cache.clear();
    }

    fn evict(&self, model_id: &str) {
        self.cache.evict(model_id);
    }

    fn cached_models(&self) -> usize {
        self.cache.len()
    }
}

/// Random but well-formed predictions, for exercising the pipeline without a
/// trained artifact.
pub struct MockPredictor {
    rng: Mutex<StdRng>,
}

impl MockPredictor {
    pub fn new() -> MockPredictor {
        MockPredictor { rng: Mutex::new(StdRng::from_entropy()) }
    }

    pub fn seeded(seed: u64) -> MockPredictor {
        MockPredictor { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }
}

impl Default for MockPredictor {
    fn default() -> Self {
        MockPredictor::new()
    }
}

impl Predictor for MockPredictor {
    /// Top class uniform over the classes with 70–95 % of the mass; the rest
    /// is spread randomly over the others. A single class gets everything.
    fn probabilities(&self, entry: &ModelEntry, _image: &[u8]) -> Result<Vec<f32>, InferenceError> {
        let k = entry.class_names.len();
        if k == 0 {
            return Err(InferenceError::Validation(format!("model {} has no classes", entry.id)));
        }
        if k == 1 {
            return Ok(vec![1.0]);
        }
        let mut rng = self.rng.lock();
        let top = rng.gen_range(0..k);
        let top_mass = rng.gen_range(0.70f32..=0.95);
        let weights: Vec<f32> = (0..k).map(|i| if i == top { 0.0 } else { rng.gen_range(0.01f32..1.0) }).collect();
        let total: f32 = weights.iter().sum();
        let rest = 1.0 - top_mass;
        Ok(weights
            .iter()
            .enumerate()
            .map(|(i, w)| if i == top { top_mass } else { rest * w / total })
            .collect())
    }
}

/// Catalog-aware predict / batch predict on top of a `Predictor`.
pub struct InferenceService {
    registry: Arc<Registry>,
    predictor: Box<dyn Predictor>,
}

impl InferenceService {
    pub fn new(registry: Arc<Registry>, predictor: Box<dyn Predictor>) -> InferenceService {
        InferenceService { registry, predictor }
    }

    fn usable_entry(&self, model_id: &str) -> Result<ModelEntry, InferenceError> {
        let entry = self.registry.get(model_id).map_err(|e| match e {
            RegistryError::NotFound(id) => InferenceError::ModelNotFound(id),
            other => InferenceError::Registry(other),
        })?;
        if entry.status == ModelStatus::Archived {
            return Err(InferenceError::Validation(format!("model {model_id} is archived")));
        }
        Ok(entry)
    }

    fn predict_entry(&self, entry: &ModelEntry, image: &[u8]) -> Result<Prediction, InferenceError> {
        let probabilities = self.predictor.probabilities(entry, image)?;
        let label = format!("{}@{}", entry.name, entry.version);
        let prediction = build_prediction(&entry.class_names, &probabilities, &label);
        if let Err(e) = self.registry.record_usage(&entry.id) {
            warn!(model_id = %entry.id, error = %e, "usage not recorded");
        }
        debug!(model_id = %entry.id, condition = %prediction.condition, confidence = prediction.confidence, "prediction");
        Ok(prediction)
    }

    pub fn predict(&self, model_id: &str, image: &[u8]) -> Result<Prediction, InferenceError> {
        let entry = self.usable_entry(model_id)?;
        self.predict_entry(&entry, image)
    }

    /// Predicts every image and marks the most confident one as primary.
    pub fn batch_predict(&self, model_id: &str, images: &[Vec<u8>]) -> Result<BatchPrediction, InferenceError> {
        if images.is_empty() {
            return Err(InferenceError::Validation("batch predict needs at least one image".into()));
        }
        let entry = self.usable_entry(model_id)?;
        let predictions = images
            .iter()
            .map(|img| self.predict_entry(&entry, img))
            .collect::<Result<Vec<_>, _>>()?;
        primary_of(predictions).ok_or_else(|| InferenceError::Validation("no predictions".into()))
    }

    pub fn clear_cache(&self) {
        self.predictor.clear_cache();
    }

    pub fn evict(&self, model_id: &str) {
        self.predictor.evict(model_id);
    }

    /// Models currently held in memory.
    pub fn cached_models(&self) -> usize {
        self.predictor.cached_models()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::InputShape;
    use chrono::Utc;

    fn entry(classes: &[&str]) -> ModelEntry {
        ModelEntry {
            id: "m1".into(),
            name: "m".into(),
            version: "1".into(),
            description: None,
            model_type: Default::default(),
            applicable_tags: vec![],
            class_names: classes.iter().map(|c| c.to_string()).collect(),
            input_shape: InputShape { width: 2, height: 2, channels: 1 },
            preprocessing: vec![],
            performance: Default::default(),
            trained_on: None,
            artifact_path: "missing".into(),
            status: ModelStatus::Testing,
            usage_count: 0,
            last_used: None,
            created_by: "t".into(),
            job_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn mock_probabilities_sum_to_one() {
        let mock = MockPredictor::seeded(9);
        let e = entry(&["a", "b", "c", "d"]);
        for _ in 0..50 {
            let p = mock.probabilities(&e, b"").unwrap();
            let sum: f32 = p.iter().sum();
            assert!((sum - 1.0).abs() < 1e-4);
            let top = p.iter().cloned().fold(f32::MIN, f32::max);
            assert!((0.70..=0.95).contains(&top));
        }
    }

    #[test]
    fn mock_single_class_is_certain() {
        let p = MockPredictor::seeded(1).probabilities(&entry(&["only"]), b"").unwrap();
        assert_eq!(p, vec![1.0]);
    }

    #[test]
    fn artifact_predictor_reports_missing_artifact() {
        let err = ArtifactPredictor::new().probabilities(&entry(&["a", "b"]), b"").unwrap_err();
        assert!(matches!(err, InferenceError::ArtifactLoad { .. }));
    }
}
