use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::network::{load_artifact, ModelMetadata, Network, NetworkError};

/// A network loaded from an artifact. `forward` needs `&mut`, so callers take
/// turns through the mutex.
pub struct LoadedModel {
    pub network: Mutex<Network>,
    pub metadata: ModelMetadata,
}

type Slot = Arc<Mutex<Option<Arc<LoadedModel>>>>;

/// Process-wide `{model id → loaded model}` map.
///
/// Each id has its own slot lock, so concurrent first requests for the same
/// model share one load while loads of different models proceed in parallel.
#[derive(Default)]
pub struct ModelCache {
    slots: Mutex<HashMap<String, Slot>>,
    loads: AtomicUsize,
}

impl ModelCache {
    pub fn new() -> ModelCache {
        ModelCache::default()
    }

    pub fn get_or_load(&self, model_id: &str, dir: &Path) -> Result<Arc<LoadedModel>, NetworkError> {
        let slot = Arc::clone(self.slots.lock().entry(model_id.to_string()).or_default());
        let mut loaded = slot.lock();
        if let Some(model) = loaded.as_ref() {
            return Ok(Arc::clone(model));
        }
        let (network, metadata) = load_artifact(dir)?;
        self.loads.fetch_add(1, Ordering::SeqCst);
        info!(model_id, dir = %dir.display(), parameters = network.parameter_count(), "model loaded");
        let model = Arc::new(LoadedModel { network: Mutex::new(network), metadata });
        *loaded = Some(Arc::clone(&model));
        Ok(model)
    }

    /// Drops one cached model.
    pub fn evict(&self, model_id: &str) {
        if self.slots.lock().remove(model_id).is_some() {
            info!(model_id, "model evicted from cache");
        }
    }

    /// Drops every cached model; requests already holding one keep it alive
    /// until they finish.
    pub fn clear(&self) {
        let dropped = {
            let mut slots = self.slots.lock();
            let n = slots.len();
            slots.clear();
            n
        };
        info!(dropped, "model cache cleared");
    }

    pub fn len(&self) -> usize {
        self.slots.lock().values().filter(|s| s.lock().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Artifact loads performed since construction.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}
