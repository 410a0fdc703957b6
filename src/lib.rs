pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod loss;
pub mod optim;
pub mod schedule;
pub mod data;
pub mod train;
pub mod config;
pub mod error;
pub mod logging;

// Convenience re-exports
pub use math::tensor::{Shape, Tensor};
pub use activation::activation::ActivationFunction;
pub use config::UNetConfig;
pub use error::{Error, Result};
pub use network::{FilterSchedule, Network, NetworkAssembler};
pub use data::{Batch, DataPipeline, DatasetSource, PetDataset};
pub use loss::{Metric, SparseCrossEntropy};
pub use optim::{Adam, Optimizer, Sgd};
pub use schedule::{LearningRate, LrScheduleBuilder, PiecewiseConstant};
pub use train::{train_network, Orchestrator, TrainPlan};
