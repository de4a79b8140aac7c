use serde::{Deserialize, Serialize};

/// Per-epoch training statistics emitted by `train_loop`.
///
/// One value is sent at the end of every completed epoch. Accuracies are
/// fractions in [0, 1]; validation fields are `None` when the job has no
/// validation samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    pub total_epochs: usize,
    /// Mean training loss over every sample seen this epoch.
    pub train_loss: f32,
    pub train_acc: f32,
    pub val_loss: Option<f32>,
    pub val_acc: Option<f32>,
    /// Wall-clock duration of this epoch in milliseconds.
    pub elapsed_ms: u64,
}

/// Progress events produced by the training loop, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainEvent {
    EpochStarted { epoch: usize, total_epochs: usize },
    EpochCompleted(EpochStats),
}
