pub mod trainer;
pub mod epoch_stats;
pub mod history;
pub mod train_config;
pub mod loop_fn;
pub mod orchestrator;

pub use trainer::{train_network, RunReport};
pub use epoch_stats::EpochStats;
pub use history::{History, TimingSummary};
pub use train_config::TrainPlan;
pub use loop_fn::{eval_step, train_loop, train_step, StepOutcome};
pub use orchestrator::{Evaluation, InferenceTiming, Orchestrator, State};
