use serde::{Serialize, Deserialize};

use crate::loss::metrics::MetricValues;

/// Per-epoch training statistics emitted by `train_loop`.
///
/// When a `progress_tx` channel is configured in `TrainPlan`, the training
/// loop sends one `EpochStats` value at the end of every completed epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Total epochs requested for this run.
    pub total_epochs: usize,
    /// Mean weighted loss over the epoch's training batches.
    pub train_loss: f64,
    /// Compiled metrics over the epoch's training batches.
    pub train_metrics: MetricValues,
    /// Mean validation loss; `None` when no validation steps ran.
    pub val_loss: Option<f64>,
    pub val_metrics: Option<MetricValues>,
    /// Rate used by the last optimiser step of the epoch.
    pub learning_rate: f64,
    /// Wall-clock duration of this single epoch in milliseconds.
    pub elapsed_ms: u64,
}

impl EpochStats {
    /// A training metric by name, if it was compiled.
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.train_metrics.get(name).copied()
    }
}
