use serde::{Serialize, Deserialize};

use crate::data::sample::LabelMap;
use crate::error::{Error, Result};
use crate::math::tensor::Tensor;

/// Probabilities are clipped into `[EPS, 1 - EPS]` before the log.
const EPS: f64 = 1e-7;

/// Sparse categorical cross-entropy with integer labels per pixel.
///
/// With `from_logits` the network output is taken as unnormalised class
/// scores and per pixel `l = logsumexp(z) - z[label]`; otherwise it is taken
/// as probabilities and `l = -ln(p[label])`. A batch reduces to
/// `sum(w * l) / N` where `N` counts every pixel of every sample in the
/// batch, weighted or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseCrossEntropy {
    pub from_logits: bool,
}

impl Default for SparseCrossEntropy {
    fn default() -> Self {
        SparseCrossEntropy::from_logits()
    }
}

impl SparseCrossEntropy {
    /// For outputs with no softmax applied (the U-Net's 1x1 projection).
    pub fn from_logits() -> SparseCrossEntropy {
        SparseCrossEntropy { from_logits: true }
    }

    pub fn from_probabilities() -> SparseCrossEntropy {
        SparseCrossEntropy { from_logits: false }
    }

    /// Weighted loss sum for one sample and the gradient w.r.t. its outputs,
    /// already divided by `normalizer` (the batch pixel count).
    ///
    /// From logits the softmax is folded into the gradient:
    /// `w * (softmax(z) - onehot) / N`.
    pub fn loss_and_grad(
        &self,
        outputs: &Tensor,
        mask: &LabelMap,
        weights: Option<&[f64]>,
        normalizer: f64,
    ) -> Result<(f64, Tensor)> {
        check_shapes(outputs, mask, weights)?;
        let classes = outputs.channels;
        let mut grad = Tensor::zeros(outputs.shape());
        let mut total = 0.0;

        for (p, (scores, out)) in outputs
            .data
            .chunks(classes)
            .zip(grad.data.chunks_mut(classes))
            .enumerate()
        {
            let label = mask.labels[p] as usize;
            let w = weights.map_or(1.0, |w| w[p]);
            let scale = w / normalizer;

            if self.from_logits {
                let log_sum = log_sum_exp(scores);
                total += w * (log_sum - scores[label]);
                for (c, (g, z)) in out.iter_mut().zip(scores.iter()).enumerate() {
                    let softmax = (z - log_sum).exp();
                    let onehot = if c == label { 1.0 } else { 0.0 };
                    *g = scale * (softmax - onehot);
                }
            } else {
                let prob = scores[label];
                let clipped = prob.clamp(EPS, 1.0 - EPS);
                total += -w * clipped.ln();
                // Clipped probabilities carry no gradient.
                if clipped == prob {
                    out[label] = -scale / prob;
                }
            }
        }
        Ok((total, grad))
    }

    /// Weighted loss sum for one sample, without a gradient.
    pub fn loss(&self, outputs: &Tensor, mask: &LabelMap, weights: Option<&[f64]>) -> Result<f64> {
        check_shapes(outputs, mask, weights)?;
        let classes = outputs.channels;
        Ok(outputs
            .data
            .chunks(classes)
            .enumerate()
            .map(|(p, scores)| {
                let label = mask.labels[p] as usize;
                let l = if self.from_logits {
                    log_sum_exp(scores) - scores[label]
                } else {
                    -scores[label].clamp(EPS, 1.0 - EPS).ln()
                };
                weights.map_or(1.0, |w| w[p]) * l
            })
            .sum())
    }
}

fn log_sum_exp(scores: &[f64]) -> f64 {
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    max + scores.iter().map(|z| (z - max).exp()).sum::<f64>().ln()
}

fn check_shapes(outputs: &Tensor, mask: &LabelMap, weights: Option<&[f64]>) -> Result<()> {
    if outputs.height != mask.height || outputs.width != mask.width {
        return Err(Error::shape(format!(
            "outputs are {}x{}, mask is {}x{}",
            outputs.height, outputs.width, mask.height, mask.width
        )));
    }
    if let Some(&label) = mask.labels.iter().find(|&&l| l as usize >= outputs.channels) {
        return Err(Error::data(format!(
            "label {} out of range for {} classes",
            label, outputs.channels
        )));
    }
    if let Some(w) = weights {
        if w.len() != mask.len() {
            return Err(Error::shape(format!(
                "{} sample weights for {} pixels",
                w.len(),
                mask.len()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tensor::Shape;

    fn logits(values: Vec<f64>, height: usize, width: usize) -> Tensor {
        let channels = values.len() / (height * width);
        Tensor::from_data(Shape::new(height, width, channels), values).unwrap()
    }

    #[test]
    fn uniform_logits_give_log_class_count() {
        let z = logits(vec![0.0; 6], 1, 2);
        let mask = LabelMap::new(1, 2, vec![0, 2]);
        let loss = SparseCrossEntropy::from_logits().loss(&z, &mask, None).unwrap();
        assert!((loss - 2.0 * 3f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn gradient_is_weighted_softmax_minus_onehot() {
        let z = logits(vec![1.0, 2.0, 0.5, 0.0, 0.0, 0.0], 1, 2);
        let mask = LabelMap::new(1, 2, vec![1, 0]);
        let weights = [0.5, 0.25];
        let (_, grad) = SparseCrossEntropy::from_logits()
            .loss_and_grad(&z, &mask, Some(&weights), 2.0)
            .unwrap();

        let third = 1.0 / 3.0;
        let expected_second = [0.25 / 2.0 * (third - 1.0), 0.25 / 2.0 * third, 0.25 / 2.0 * third];
        for (g, e) in grad.data[3..].iter().zip(expected_second.iter()) {
            assert!((g - e).abs() < 1e-12);
        }
        // Each pixel's gradient sums to zero across classes.
        assert!(grad.data[..3].iter().sum::<f64>().abs() < 1e-12);
    }

    fn assert_matches_finite_difference(loss: SparseCrossEntropy, z: Tensor, mask: LabelMap) {
        let weights = [0.7, 0.3];
        let (_, grad) = loss.loss_and_grad(&z, &mask, Some(&weights), 1.0).unwrap();

        let h = 1e-6;
        for i in 0..z.data.len() {
            let mut plus = z.clone();
            plus.data[i] += h;
            let mut minus = z.clone();
            minus.data[i] -= h;
            let numeric = (loss.loss(&plus, &mask, Some(&weights)).unwrap()
                - loss.loss(&minus, &mask, Some(&weights)).unwrap())
                / (2.0 * h);
            assert!((numeric - grad.data[i]).abs() < 1e-6, "index {i}");
        }
    }

    #[test]
    fn logit_gradient_matches_finite_difference() {
        let z = logits(vec![0.3, -1.2, 0.8, 2.0, 0.1, -0.4], 2, 1);
        assert_matches_finite_difference(
            SparseCrossEntropy::from_logits(),
            z,
            LabelMap::new(2, 1, vec![2, 0]),
        );
    }

    #[test]
    fn probability_gradient_matches_finite_difference() {
        let p = logits(vec![0.2, 0.5, 0.3, 0.6, 0.1, 0.3], 2, 1);
        assert_matches_finite_difference(
            SparseCrossEntropy::from_probabilities(),
            p,
            LabelMap::new(2, 1, vec![1, 0]),
        );
    }

    #[test]
    fn probabilities_are_clipped_before_the_log() {
        let p = logits(vec![1.0, 0.0], 1, 1);
        let mask = LabelMap::new(1, 1, vec![1]);
        let loss = SparseCrossEntropy::from_probabilities();
        let (value, grad) = loss.loss_and_grad(&p, &mask, None, 1.0).unwrap();
        assert!((value + EPS.ln()).abs() < 1e-9);
        assert!(grad.data.iter().all(|g| *g == 0.0));
        let half = logits(vec![0.5, 0.5], 1, 1);
        assert!((loss.loss(&half, &mask, None).unwrap() - 2f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn large_logits_stay_finite() {
        let z = logits(vec![1000.0, -1000.0], 1, 1);
        let mask = LabelMap::new(1, 1, vec![1]);
        let (loss, grad) = SparseCrossEntropy::from_logits()
            .loss_and_grad(&z, &mask, None, 1.0)
            .unwrap();
        assert!((loss - 2000.0).abs() < 1e-9);
        assert!(grad.data.iter().all(|g| g.is_finite()));
    }

    #[test]
    fn mismatched_inputs_rejected() {
        let loss = SparseCrossEntropy::default();
        let z = logits(vec![0.0; 4], 1, 2);
        assert!(matches!(
            loss.loss(&z, &LabelMap::new(2, 1, vec![0, 0]), None),
            Err(Error::ShapeMismatch(_))
        ));
        assert!(matches!(
            loss.loss(&z, &LabelMap::new(1, 2, vec![0, 2]), None),
            Err(Error::Data(_))
        ));
        assert!(loss.loss(&z, &LabelMap::new(1, 2, vec![0, 1]), Some(&[1.0])).is_err());
    }
}
