use std::sync::atomic::AtomicBool;
use std::sync::mpsc;
use std::sync::Arc;

use crate::train::epoch_stats::TrainEvent;

/// Configuration for a `train_loop` run.
///
/// # Fields
/// - `epochs`      : total number of full passes over the training data
/// - `batch_size`  : samples per optimizer step
/// - `progress_tx` : optional channel; receives `EpochStarted` before and
///                   `EpochCompleted` after every epoch. A dropped receiver
///                   does not stop training.
/// - `stop_flag`   : optional atomic flag polled at every step boundary; when
///                   set the loop returns `TrainError::Cancelled`.
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub progress_tx: Option<mpsc::Sender<TrainEvent>>,
    pub stop_flag: Option<Arc<AtomicBool>>,
}

impl TrainConfig {
    /// Creates a minimal `TrainConfig` with no progress channel and no stop flag.
    pub fn new(epochs: usize, batch_size: usize) -> Self {
        TrainConfig { epochs, batch_size, progress_tx: None, stop_flag: None }
    }
}
