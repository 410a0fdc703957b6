pub mod adam;
pub mod sgd;

pub use adam::Adam;
pub use sgd::Sgd;

use crate::config::{OptimizerKind, UNetConfig};
use crate::layers::param::Param;
use crate::schedule::LearningRate;

/// Updates parameters from their accumulated gradients.
///
/// `params` must arrive in the same order on every call; stateful optimisers
/// key their moment buffers by position.
pub trait Optimizer: Send {
    /// Applies one update and returns the learning rate it used.
    fn step(&mut self, params: &mut [&mut Param]) -> f64;

    /// Number of completed `step` calls.
    fn iterations(&self) -> usize;

    /// Rate the next `step` will use.
    fn learning_rate(&self) -> f64;

    fn name(&self) -> &'static str;
}

/// The optimiser selected by `config.optimizer`, driven by `schedule`.
pub fn from_config(config: &UNetConfig, schedule: Box<dyn LearningRate>) -> Box<dyn Optimizer> {
    match config.optimizer {
        OptimizerKind::Adam => Box::new(Adam::new(schedule)),
        OptimizerKind::Sgd => Box::new(Sgd::new(schedule)),
    }
}
