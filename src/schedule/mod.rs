//! Step-indexed learning-rate schedules.

pub mod piecewise;

pub use piecewise::{LrScheduleBuilder, PiecewiseConstant};

/// A learning rate as a function of the optimiser step (0-based).
pub trait LearningRate: Send {
    fn rate_at(&self, step: usize) -> f64;
}

/// The same rate at every step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constant(pub f64);

impl LearningRate for Constant {
    fn rate_at(&self, _step: usize) -> f64 {
        self.0
    }
}
