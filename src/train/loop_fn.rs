use std::sync::atomic::Ordering;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::data::pipeline::BatchStream;
use crate::data::sample::Batch;
use crate::error::{Error, Result};
use crate::loss::metrics::{metric_values, ConfusionMatrix};
use crate::loss::Objective;
use crate::network::network::Network;
use crate::optim::Optimizer;
use crate::train::epoch_stats::EpochStats;
use crate::train::history::History;
use crate::train::train_config::TrainPlan;

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Trains `network` for `plan.epochs` epochs of `plan.steps_per_epoch`
/// batches drawn from `train`, validating on `plan.validation_steps` batches
/// of `validation` after each epoch. Losses and metrics come from
/// `objective`.
///
/// # Early termination
/// The loop stops after the current epoch if:
/// - the `progress_tx` receiver has been dropped, **or**
/// - `plan.stop_flag` is set to `true`.
///
/// # Errors
/// Any failing step (bad batch, shape mismatch, diverged loss) aborts the
/// run; there is no retry. A stream that ends before the plan is satisfied
/// is a data error.
pub fn train_loop(
    network: &mut Network,
    optimizer: &mut dyn Optimizer,
    objective: &Objective,
    train: &mut BatchStream,
    mut validation: Option<&mut BatchStream>,
    plan: &TrainPlan,
) -> Result<History> {
    let mut history = History::default();
    let validation_steps = if validation.is_some() { plan.validation_steps } else { 0 };
    if validation_steps == 0 {
        warn!("no validation steps per epoch; validation is skipped");
    }

    for epoch in 1..=plan.epochs {
        if stop_requested(plan) {
            info!(epoch, "stop requested, ending training");
            break;
        }
        let t_start = Instant::now();

        // ── Training steps ───────────────────────────────────────────────
        let mut train_totals = Totals::default();
        let mut learning_rate = optimizer.learning_rate();
        for step in 0..plan.steps_per_epoch {
            let batch = next_batch(train, "training")?;
            let outcome = train_step(network, optimizer, objective, &batch)?;
            learning_rate = outcome.learning_rate;
            debug!(epoch, step, loss = outcome.loss, lr = learning_rate, "train step");
            train_totals.add(&outcome, batch.len());
        }

        // ── Validation ────────────────────────────────────────────────────
        let (val_loss, val_metrics) = match validation.as_deref_mut() {
            Some(stream) if validation_steps > 0 => {
                let mut totals = Totals::default();
                for _ in 0..validation_steps {
                    let batch = next_batch(stream, "validation")?;
                    totals.add(&eval_step(network, objective, &batch)?, batch.len());
                }
                (Some(totals.mean_loss()), Some(metric_values(&objective.metrics, &totals.confusion)))
            }
            _ => (None, None),
        };

        let stats = EpochStats {
            epoch,
            total_epochs: plan.epochs,
            train_loss: train_totals.mean_loss(),
            train_metrics: metric_values(&objective.metrics, &train_totals.confusion),
            val_loss,
            val_metrics,
            learning_rate,
            elapsed_ms: t_start.elapsed().as_millis() as u64,
        };
        info!(
            epoch,
            total = plan.epochs,
            loss = stats.train_loss,
            metrics = ?stats.train_metrics,
            val_loss = ?stats.val_loss,
            val_metrics = ?stats.val_metrics,
            lr = stats.learning_rate,
            elapsed_ms = stats.elapsed_ms,
            "epoch complete"
        );
        history.push(stats.clone());

        // ── Emit progress ─────────────────────────────────────────────────
        if let Some(ref tx) = plan.progress_tx {
            // If the receiver has been dropped, stop training.
            if tx.send(stats).is_err() {
                info!(epoch, "progress receiver dropped, ending training");
                break;
            }
        }
    }

    Ok(history)
}

/// Loss and pixel counts of one batch.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// `sum(w * l) / N` over the batch's pixels.
    pub loss: f64,
    pub confusion: ConfusionMatrix,
    /// Rate the optimiser used; `0.0` for evaluation steps.
    pub learning_rate: f64,
}

/// Forward and backward pass over every sample of `batch`, then one
/// optimiser update with the accumulated gradients.
pub fn train_step(
    network: &mut Network,
    optimizer: &mut dyn Optimizer,
    objective: &Objective,
    batch: &Batch,
) -> Result<StepOutcome> {
    let normalizer = pixel_count(batch)?;
    let output = network.graph.output();
    network.graph.zero_grad();

    let mut loss = 0.0;
    let mut confusion = ConfusionMatrix::new();
    for (i, (image, mask)) in batch.images.iter().zip(batch.masks.iter()).enumerate() {
        let weights = batch.weights.as_ref().map(|w| w[i].as_slice());
        let trace = network.graph.forward(image)?;
        let scores = trace.get(output);
        let (sample_loss, grad) = objective.loss.loss_and_grad(scores, mask, weights, normalizer)?;
        confusion.update(scores, mask);
        loss += sample_loss;
        network.graph.backward(&trace, grad)?;
    }

    let loss = loss / normalizer;
    if !loss.is_finite() {
        return Err(Error::compute(format!("loss diverged to {}", loss)));
    }
    let learning_rate = optimizer.step(&mut network.graph.params_mut());
    Ok(StepOutcome { loss, confusion, learning_rate })
}

/// Forward pass only.
pub fn eval_step(network: &Network, objective: &Objective, batch: &Batch) -> Result<StepOutcome> {
    let normalizer = pixel_count(batch)?;
    let mut loss = 0.0;
    let mut confusion = ConfusionMatrix::new();
    for (i, (image, mask)) in batch.images.iter().zip(batch.masks.iter()).enumerate() {
        let weights = batch.weights.as_ref().map(|w| w[i].as_slice());
        let scores = network.predict(image)?;
        loss += objective.loss.loss(&scores, mask, weights)?;
        confusion.update(&scores, mask);
    }
    Ok(StepOutcome { loss: loss / normalizer, confusion, learning_rate: 0.0 })
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Batch-size weighted running mean of step losses, plus pooled pixel
/// counts.
#[derive(Default)]
pub(crate) struct Totals {
    loss_sum: f64,
    samples: usize,
    pub(crate) confusion: ConfusionMatrix,
}

impl Totals {
    pub(crate) fn add(&mut self, outcome: &StepOutcome, batch_len: usize) {
        self.loss_sum += outcome.loss * batch_len as f64;
        self.samples += batch_len;
        self.confusion.merge(&outcome.confusion);
    }

    pub(crate) fn samples(&self) -> usize {
        self.samples
    }

    pub(crate) fn mean_loss(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.loss_sum / self.samples as f64
        }
    }
}

fn pixel_count(batch: &Batch) -> Result<f64> {
    if batch.is_empty() {
        return Err(Error::data("empty batch"));
    }
    if batch.images.len() != batch.masks.len() {
        return Err(Error::data(format!(
            "{} images but {} masks in batch",
            batch.images.len(),
            batch.masks.len()
        )));
    }
    if let Some(weights) = &batch.weights {
        if weights.len() != batch.masks.len() {
            return Err(Error::data("sample weights do not cover every mask"));
        }
    }
    Ok(batch.masks.iter().map(|m| m.len()).sum::<usize>() as f64)
}

fn next_batch(stream: &mut BatchStream, name: &str) -> Result<Batch> {
    stream
        .next()
        .ok_or_else(|| Error::data(format!("{} stream ended before the epoch finished", name)))?
}

fn stop_requested(plan: &TrainPlan) -> bool {
    plan.stop_flag
        .as_ref()
        .map(|flag| flag.load(Ordering::Relaxed))
        .unwrap_or(false)
}
