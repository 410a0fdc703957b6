use std::sync::Arc;

use tracing::info;

use crate::config::UNetConfig;
use crate::data::dataset::{DatasetSource, SplitSources};
use crate::data::pipeline::DataPipeline;
use crate::error::Result;
use crate::loss::SparseCrossEntropy;
use crate::network::assembler::NetworkAssembler;
use crate::network::network::Network;
use crate::optim;
use crate::schedule::LrScheduleBuilder;
use crate::train::history::{History, TimingSummary};
use crate::train::orchestrator::{Evaluation, Orchestrator};
use crate::train::train_config::TrainPlan;

/// Everything a finished run hands back for persistence.
pub struct RunReport {
    pub network: Network,
    pub history: History,
    pub evaluation: Evaluation,
    pub timing: TimingSummary,
}

/// The whole procedure: split, build pipelines, assemble, compile with the
/// scheduled optimiser, fit, evaluate on the test split, time inference.
///
/// `plan_hook` may attach a progress channel or stop flag to the plan.
pub fn train_network(
    config: &UNetConfig,
    source: Arc<dyn DatasetSource>,
    plan_hook: impl FnOnce(TrainPlan) -> TrainPlan,
) -> Result<RunReport> {
    config.validate()?;
    let splits = SplitSources::new(source, config)?;

    let plan = TrainPlan::from_counts(
        splits.train.len(),
        splits.validation.len(),
        config.batch_size,
        config.validation_sub_splits,
        config.epochs,
    )?;
    let plan = plan_hook(plan);

    let schedule = LrScheduleBuilder::from_config(config)
        .steps_per_epoch(plan.steps_per_epoch)
        .build()?;
    info!(boundaries = ?schedule.boundaries(), "learning-rate schedule");

    let network = NetworkAssembler::new(config).assemble()?;
    let mut orchestrator = Orchestrator::new(network, config);
    orchestrator.compile(
        SparseCrossEntropy::from_logits(),
        optim::from_config(config, Box::new(schedule)),
        &config.metrics,
    )?;

    let train = DataPipeline::training(Arc::clone(&splits.train), config)?;
    let validation = if plan.validation_steps > 0 {
        Some(DataPipeline::validation(Arc::clone(&splits.validation), config)?)
    } else {
        None
    };
    orchestrator.fit(train, validation, plan)?;

    let evaluation = orchestrator.evaluate(DataPipeline::test(Arc::clone(&splits.test), config))?;
    let inference = orchestrator.predict_timed(
        DataPipeline::test(Arc::clone(&splits.test), config),
        config.inference_batches,
    )?;
    let timing = orchestrator.timing_summary(&inference)?;
    let history = orchestrator.history().clone();

    Ok(RunReport {
        network: orchestrator.into_network(),
        history,
        evaluation,
        timing,
    })
}
