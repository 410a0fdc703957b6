pub mod cross_entropy;
pub mod metrics;

pub use cross_entropy::SparseCrossEntropy;
pub use metrics::{argmax_labels, metric_values, ConfusionMatrix, Metric, MetricValues};

/// The loss a network is trained against and the metrics reported with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Objective {
    pub loss: SparseCrossEntropy,
    pub metrics: Vec<Metric>,
}

impl Objective {
    pub fn new(loss: SparseCrossEntropy, metrics: &[Metric]) -> Objective {
        let mut unique: Vec<Metric> = Vec::with_capacity(metrics.len());
        for &m in metrics {
            if !unique.contains(&m) {
                unique.push(m);
            }
        }
        Objective { loss, metrics: unique }
    }
}
