use serde::Serialize;

use crate::config::{validate_schedule, UNetConfig};
use crate::error::{Error, Result};
use crate::schedule::LearningRate;

/// Piecewise-constant rate over absolute step boundaries.
///
/// `values[0]` applies before the first boundary; once `step` reaches
/// `boundaries[i]` the rate becomes `values[i + 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PiecewiseConstant {
    boundaries: Vec<usize>,
    values: Vec<f64>,
}

impl PiecewiseConstant {
    pub fn new(boundaries: Vec<usize>, values: Vec<f64>) -> Result<PiecewiseConstant> {
        if values.len() != boundaries.len() + 1 {
            return Err(Error::config(format!(
                "{} boundaries need {} learning rates, got {}",
                boundaries.len(),
                boundaries.len() + 1,
                values.len()
            )));
        }
        if boundaries.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::config(format!(
                "step boundaries must be strictly increasing, got {:?}",
                boundaries
            )));
        }
        if values.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(Error::config("learning rates must be finite and positive"));
        }
        Ok(PiecewiseConstant { boundaries, values })
    }

    pub fn boundaries(&self) -> &[usize] {
        &self.boundaries
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

impl LearningRate for PiecewiseConstant {
    fn rate_at(&self, step: usize) -> f64 {
        let segment = self.boundaries.partition_point(|&b| b <= step);
        self.values[segment]
    }
}

/// Turns epoch fractions into absolute step boundaries:
/// `round(epochs * fraction * steps_per_epoch)`.
#[derive(Debug, Clone)]
pub struct LrScheduleBuilder {
    fractions: Vec<f64>,
    values: Vec<f64>,
    steps_per_epoch: usize,
    epochs: usize,
}

impl LrScheduleBuilder {
    pub fn new(fractions: Vec<f64>, values: Vec<f64>) -> LrScheduleBuilder {
        LrScheduleBuilder { fractions, values, steps_per_epoch: 1, epochs: 1 }
    }

    pub fn from_config(config: &UNetConfig) -> LrScheduleBuilder {
        LrScheduleBuilder::new(config.lr_boundaries.clone(), config.lr_values.clone())
            .epochs(config.epochs)
    }

    pub fn steps_per_epoch(mut self, steps: usize) -> Self {
        self.steps_per_epoch = steps;
        self
    }

    pub fn epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Fails if the value count is not `fractions + 1`, if the fractions are
    /// not strictly increasing inside (0, 1), or if rounding collapses two
    /// boundaries onto the same step.
    pub fn build(self) -> Result<PiecewiseConstant> {
        validate_schedule(&self.fractions, &self.values)?;
        let total = (self.epochs * self.steps_per_epoch) as f64;
        let boundaries = self
            .fractions
            .iter()
            .map(|f| (total * f).round() as usize)
            .collect();
        PiecewiseConstant::new(boundaries, self.values)
    }
}
