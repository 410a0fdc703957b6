use crate::data::sample::{Batch, LabelMap};
use crate::error::{Error, Result};

/// Per-class loss weights, used to counter class imbalance.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassWeights {
    raw: Vec<f64>,
}

impl ClassWeights {
    pub fn new(raw: Vec<f64>) -> Result<ClassWeights> {
        if raw.is_empty() {
            return Err(Error::config("class weights must not be empty"));
        }
        if raw.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::config("class weights must be finite and non-negative"));
        }
        if raw.iter().sum::<f64>() <= 0.0 {
            return Err(Error::config("class weights must not all be zero"));
        }
        Ok(ClassWeights { raw })
    }

    pub fn class_count(&self) -> usize {
        self.raw.len()
    }

    /// `raw[c] / sum(raw)`; sums to 1.
    pub fn normalized(&self) -> Vec<f64> {
        let total: f64 = self.raw.iter().sum();
        self.raw.iter().map(|w| w / total).collect()
    }

    /// Gathers the normalised weight of every pixel's class.
    pub fn sample_weights(&self, mask: &LabelMap) -> Result<Vec<f64>> {
        let normalized = self.normalized();
        mask.labels
            .iter()
            .map(|&label| {
                normalized.get(label as usize).copied().ok_or_else(|| {
                    Error::data(format!(
                        "label {} has no weight ({} classes)",
                        label,
                        normalized.len()
                    ))
                })
            })
            .collect()
    }

    /// Attaches per-pixel weights to every mask of the batch.
    pub fn weigh_batch(&self, mut batch: Batch) -> Result<Batch> {
        let weights = batch
            .masks
            .iter()
            .map(|mask| self.sample_weights(mask))
            .collect::<Result<Vec<_>>>()?;
        batch.weights = Some(weights);
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_weights_sum_to_one() {
        let w = ClassWeights::new(vec![1.0, 1.0, 2.0]).unwrap();
        assert_eq!(w.normalized(), vec![0.25, 0.25, 0.5]);
        let w = ClassWeights::new(vec![0.3, 1.7, 5.0, 2.0]).unwrap();
        assert!((w.normalized().iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn each_pixel_gets_its_class_weight() {
        let w = ClassWeights::new(vec![1.0, 1.0, 2.0]).unwrap();
        let mask = LabelMap::new(2, 2, vec![0, 2, 1, 2]);
        assert_eq!(w.sample_weights(&mask).unwrap(), vec![0.25, 0.5, 0.25, 0.5]);
    }

    #[test]
    fn unknown_label_is_a_data_error() {
        let w = ClassWeights::new(vec![1.0, 1.0, 2.0]).unwrap();
        let mask = LabelMap::new(1, 1, vec![3]);
        assert!(matches!(w.sample_weights(&mask), Err(Error::Data(_))));
    }

    #[test]
    fn degenerate_weights_rejected() {
        assert!(ClassWeights::new(vec![]).is_err());
        assert!(ClassWeights::new(vec![0.0, 0.0]).is_err());
        assert!(ClassWeights::new(vec![1.0, -1.0]).is_err());
    }
}
