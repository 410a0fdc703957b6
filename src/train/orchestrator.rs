use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::UNetConfig;
use crate::data::pipeline::BatchStream;
use crate::error::{Error, Result};
use crate::loss::cross_entropy::SparseCrossEntropy;
use crate::loss::metrics::{metric_values, Metric, MetricValues};
use crate::loss::Objective;
use crate::network::network::Network;
use crate::optim::Optimizer;
use crate::train::history::{History, TimingSummary};
use crate::train::loop_fn::{eval_step, train_loop, Totals};
use crate::train::train_config::TrainPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unconfigured,
    Compiled,
    Training,
    Trained,
}

impl State {
    pub fn name(self) -> &'static str {
        match self {
            State::Unconfigured => "unconfigured",
            State::Compiled => "compiled",
            State::Training => "training",
            State::Trained => "trained",
        }
    }
}

/// Loss and compiled metrics over a whole stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub loss: f64,
    pub metrics: MetricValues,
    pub batches: usize,
}

/// Forward-pass timing over the first batches of a stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceTiming {
    pub batches: usize,
    pub total_secs: f64,
    pub avg_secs: f64,
}

/// Owns the network for the length of a run and drives it through
/// `Unconfigured → Compiled → Training → Trained`.
///
/// `compile` supplies the loss, the optimiser and the metrics.
pub struct Orchestrator {
    network: Network,
    mask_shape: (usize, usize),
    output_classes: usize,
    objective: Option<Objective>,
    optimizer: Option<Box<dyn Optimizer>>,
    state: State,
    history: History,
    plan: Option<TrainPlan>,
    train_secs: f64,
}

impl Orchestrator {
    pub fn new(network: Network, config: &UNetConfig) -> Orchestrator {
        Orchestrator {
            network,
            mask_shape: config.mask_shape(),
            output_classes: config.output_classes,
            objective: None,
            optimizer: None,
            state: State::Unconfigured,
            history: History::default(),
            plan: None,
            train_secs: 0.0,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn into_network(self) -> Network {
        self.network
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Wall-clock seconds of the last `fit`.
    pub fn train_secs(&self) -> f64 {
        self.train_secs
    }

    fn require(&self, expected: State) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidState {
                expected: expected.name(),
                found: self.state.name(),
            });
        }
        Ok(())
    }

    /// The compiled loss and metrics; `None` before `compile`.
    pub fn objective(&self) -> Option<&Objective> {
        self.objective.as_ref()
    }

    fn compiled_objective(&self) -> Result<&Objective> {
        self.objective
            .as_ref()
            .ok_or_else(|| Error::compute("compiled without a loss"))
    }

    /// Attaches the loss, the optimiser and the metrics to report. Fails if
    /// the network's output does not match the mask geometry and class
    /// count the data will carry. Repeated metrics are kept once.
    pub fn compile(
        &mut self,
        loss: SparseCrossEntropy,
        optimizer: Box<dyn Optimizer>,
        metrics: &[Metric],
    ) -> Result<()> {
        self.require(State::Unconfigured)?;
        let out = self.network.output_shape();
        if (out.height, out.width) != self.mask_shape || out.channels != self.output_classes {
            return Err(Error::shape(format!(
                "network output {} does not match mask {}x{} with {} classes",
                out, self.mask_shape.0, self.mask_shape.1, self.output_classes
            )));
        }
        let objective = Objective::new(loss, metrics);
        info!(
            optimizer = optimizer.name(),
            from_logits = objective.loss.from_logits,
            metrics = ?objective.metrics.iter().map(|m| m.name()).collect::<Vec<_>>(),
            params = self.network.param_count(),
            "compiled network"
        );
        self.objective = Some(objective);
        self.optimizer = Some(optimizer);
        self.state = State::Compiled;
        Ok(())
    }

    /// Runs the plan. On failure the run is abandoned and the orchestrator
    /// returns to `Compiled`; parameters keep whatever updates were applied.
    pub fn fit(
        &mut self,
        mut train: BatchStream,
        mut validation: Option<BatchStream>,
        plan: TrainPlan,
    ) -> Result<&History> {
        self.require(State::Compiled)?;
        let objective = self.compiled_objective()?.clone();
        let mut optimizer = self
            .optimizer
            .take()
            .ok_or_else(|| Error::compute("compiled without an optimiser"))?;
        self.state = State::Training;
        info!(
            epochs = plan.epochs,
            steps_per_epoch = plan.steps_per_epoch,
            validation_steps = plan.validation_steps,
            "training started"
        );

        let started = Instant::now();
        let outcome = train_loop(
            &mut self.network,
            &mut *optimizer,
            &objective,
            &mut train,
            validation.as_mut(),
            &plan,
        );
        self.train_secs = started.elapsed().as_secs_f64();
        self.optimizer = Some(optimizer);

        match outcome {
            Ok(history) => {
                info!(secs = self.train_secs, epochs = history.len(), "training finished");
                self.history = history;
                self.plan = Some(plan);
                self.state = State::Trained;
                Ok(&self.history)
            }
            Err(err) => {
                warn!(error = %err, "training aborted");
                self.state = State::Compiled;
                Err(err)
            }
        }
    }

    /// Mean loss and compiled metrics over every batch of a finite stream.
    pub fn evaluate(&self, test: BatchStream) -> Result<Evaluation> {
        self.require(State::Trained)?;
        let objective = self.compiled_objective()?;
        let mut totals = Totals::default();
        let mut batches = 0;
        for batch in test {
            let batch = batch?;
            totals.add(&eval_step(&self.network, objective, &batch)?, batch.len());
            batches += 1;
        }
        if totals.samples() == 0 {
            return Err(Error::data("evaluation stream was empty"));
        }
        let evaluation = Evaluation {
            loss: totals.mean_loss(),
            metrics: metric_values(&objective.metrics, &totals.confusion),
            batches,
        };
        info!(loss = evaluation.loss, metrics = ?evaluation.metrics, "evaluated");
        Ok(evaluation)
    }

    /// Times the forward pass alone over at most `max_batches` batches.
    /// Batch loading is excluded from the measurement.
    pub fn predict_timed(&self, test: BatchStream, max_batches: usize) -> Result<InferenceTiming> {
        self.require(State::Trained)?;
        let mut total_secs = 0.0;
        let mut batches = 0;
        for batch in test.take(max_batches) {
            let batch = batch?;
            let started = Instant::now();
            self.network.predict_batch(&batch.images)?;
            total_secs += started.elapsed().as_secs_f64();
            batches += 1;
        }
        if batches == 0 {
            return Err(Error::data("no batches to time"));
        }
        let avg_secs = total_secs / batches as f64;
        info!(batches, avg_secs, "timed inference");
        Ok(InferenceTiming { batches, total_secs, avg_secs })
    }

    /// Averages over the epochs that completed, which is fewer than planned
    /// when a stop was requested.
    pub fn timing_summary(&self, inference: &InferenceTiming) -> Result<TimingSummary> {
        self.require(State::Trained)?;
        let plan = self
            .plan
            .as_ref()
            .ok_or_else(|| Error::compute("trained without a plan"))?;
        Ok(TimingSummary::new(
            plan.batch_size,
            self.history.len(),
            plan.steps_per_epoch,
            self.train_secs,
            inference.avg_secs,
        ))
    }
}
