use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::loss::metrics::MetricValues;
use crate::train::epoch_stats::EpochStats;

/// Every completed epoch of a `fit` run, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub epochs: Vec<EpochStats>,
}

impl History {
    pub fn push(&mut self, stats: EpochStats) {
        self.epochs.push(stats);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn last(&self) -> Option<&EpochStats> {
        self.epochs.last()
    }

    /// Metric name → one value per epoch: `loss`, `lr`, every compiled
    /// metric, and `val_loss` / `val_<metric>` when validation ran every
    /// epoch.
    pub fn by_metric(&self) -> BTreeMap<String, Vec<f64>> {
        let mut metrics = BTreeMap::new();
        metrics.insert("loss".to_string(), self.epochs.iter().map(|e| e.train_loss).collect());
        metrics.insert("lr".to_string(), self.epochs.iter().map(|e| e.learning_rate).collect());
        let Some(first) = self.epochs.first() else {
            return metrics;
        };
        for name in first.train_metrics.keys() {
            let values = self.epochs.iter().filter_map(|e| e.train_metrics.get(name).copied());
            metrics.insert(name.clone(), values.collect());
        }

        let val_loss: Option<Vec<f64>> = self.epochs.iter().map(|e| e.val_loss).collect();
        let val_metrics: Option<Vec<&MetricValues>> =
            self.epochs.iter().map(|e| e.val_metrics.as_ref()).collect();
        if let (Some(loss), Some(per_epoch)) = (val_loss, val_metrics) {
            metrics.insert("val_loss".to_string(), loss);
            for name in per_epoch[0].keys() {
                let values = per_epoch.iter().filter_map(|m| m.get(name).copied());
                metrics.insert(format!("val_{}", name), values.collect());
            }
        }
        metrics
    }

    pub fn save_json(&self, path: &str) -> crate::error::Result<()> {
        let json = serde_json::to_string_pretty(&self.by_metric())?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Wall-clock statistics of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingSummary {
    pub batch_size: usize,
    pub epoch_count: usize,
    /// Mean seconds per timed inference batch.
    pub avg_inference_time: f64,
    /// Seconds spent in `fit`.
    pub total_train_time: f64,
    pub avg_epoch_time: f64,
    pub avg_image_time: f64,
}

impl TimingSummary {
    /// `avg_epoch_time = total / epochs`,
    /// `avg_image_time = avg_epoch_time / (steps_per_epoch * batch_size)`.
    ///
    /// `epoch_count` is the number of epochs that completed; with none the
    /// averages are zero.
    pub fn new(
        batch_size: usize,
        epoch_count: usize,
        steps_per_epoch: usize,
        total_train_time: f64,
        avg_inference_time: f64,
    ) -> TimingSummary {
        let avg_epoch_time = if epoch_count == 0 {
            0.0
        } else {
            total_train_time / epoch_count as f64
        };
        let images_per_epoch = (steps_per_epoch * batch_size).max(1) as f64;
        TimingSummary {
            batch_size,
            epoch_count,
            avg_inference_time,
            total_train_time,
            avg_epoch_time,
            avg_image_time: avg_epoch_time / images_per_epoch,
        }
    }

    pub fn save_json(&self, path: &str) -> crate::error::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
