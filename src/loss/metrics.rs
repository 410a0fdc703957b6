use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::data::sample::LabelMap;
use crate::math::tensor::Tensor;

/// Per-pixel metric tracked alongside the loss.
///
/// - `Accuracy`: fraction of pixels whose argmax matches the label.
/// - `MeanIou`: intersection over union per class, averaged over the
///   classes that appear in either the labels or the predictions.
///
/// Sample weights only scale the loss; every metric counts each pixel once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Accuracy,
    MeanIou,
}

impl Metric {
    /// Key used in the history and in the evaluation record.
    pub fn name(self) -> &'static str {
        match self {
            Metric::Accuracy => "accuracy",
            Metric::MeanIou => "mean_iou",
        }
    }

    pub fn value(self, confusion: &ConfusionMatrix) -> f64 {
        match self {
            Metric::Accuracy => confusion.accuracy(),
            Metric::MeanIou => confusion.mean_iou(),
        }
    }
}

/// Metric name → value, in name order.
pub type MetricValues = BTreeMap<String, f64>;

pub fn metric_values(metrics: &[Metric], confusion: &ConfusionMatrix) -> MetricValues {
    metrics
        .iter()
        .map(|m| (m.name().to_string(), m.value(confusion)))
        .collect()
}

/// Index of the largest class score at every pixel; ties go to the lower
/// class index.
pub fn argmax_labels(scores: &Tensor) -> Vec<u8> {
    scores
        .data
        .chunks(scores.channels.max(1))
        .map(|pixel| {
            let mut best = 0;
            for (c, &s) in pixel.iter().enumerate() {
                if s > pixel[best] {
                    best = c;
                }
            }
            best as u8
        })
        .collect()
}

/// Running `(label, predicted)` pixel counts over any number of samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfusionMatrix {
    counts: BTreeMap<(u8, u8), usize>,
    total: usize,
}

impl ConfusionMatrix {
    pub fn new() -> ConfusionMatrix {
        ConfusionMatrix::default()
    }

    pub fn update(&mut self, scores: &Tensor, mask: &LabelMap) {
        for (&predicted, &label) in argmax_labels(scores).iter().zip(mask.labels.iter()) {
            *self.counts.entry((label, predicted)).or_insert(0) += 1;
            self.total += 1;
        }
    }

    pub fn merge(&mut self, other: &ConfusionMatrix) {
        for (&key, &count) in &other.counts {
            *self.counts.entry(key).or_insert(0) += count;
        }
        self.total += other.total;
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let correct: usize = self
            .counts
            .iter()
            .filter(|((label, predicted), _)| label == predicted)
            .map(|(_, &n)| n)
            .sum();
        correct as f64 / self.total as f64
    }

    pub fn mean_iou(&self) -> f64 {
        let mut labelled: BTreeMap<u8, usize> = BTreeMap::new();
        let mut predicted: BTreeMap<u8, usize> = BTreeMap::new();
        for (&(l, p), &n) in &self.counts {
            *labelled.entry(l).or_insert(0) += n;
            *predicted.entry(p).or_insert(0) += n;
        }
        let mut classes: Vec<u8> = labelled.keys().chain(predicted.keys()).copied().collect();
        classes.sort_unstable();
        classes.dedup();
        if classes.is_empty() {
            return 0.0;
        }

        let sum: f64 = classes
            .iter()
            .map(|c| {
                let hit = self.counts.get(&(*c, *c)).copied().unwrap_or(0);
                let union = labelled.get(c).copied().unwrap_or(0)
                    + predicted.get(c).copied().unwrap_or(0)
                    - hit;
                hit as f64 / union as f64
            })
            .sum();
        sum / classes.len() as f64
    }
}
