use std::sync::mpsc;
use std::sync::{Arc, atomic::AtomicBool};

use crate::error::{Error, Result};
use crate::train::epoch_stats::EpochStats;

/// How long a `fit` run lasts, plus its optional control channels.
///
/// # Fields
/// - `epochs`:           number of epochs
/// - `steps_per_epoch`:  training batches drawn per epoch
/// - `validation_steps`: validation batches drawn per epoch; `0` skips
///                       validation
/// - `batch_size`:       samples per batch, used for timing statistics
/// - `progress_tx`:      optional channel sender; one `EpochStats` is sent
///                       per completed epoch. If the receiver is dropped the
///                       loop terminates early.
/// - `stop_flag`:        optional atomic flag; when set from another thread
///                       the loop terminates after the current epoch.
#[derive(Debug, Clone)]
pub struct TrainPlan {
    pub epochs: usize,
    pub steps_per_epoch: usize,
    pub validation_steps: usize,
    pub batch_size: usize,
    pub progress_tx: Option<mpsc::Sender<EpochStats>>,
    pub stop_flag: Option<Arc<AtomicBool>>,
}

impl TrainPlan {
    /// Derives step counts from split sizes:
    /// `steps_per_epoch = train / batch`,
    /// `validation_steps = val / batch / sub_splits` (all floor division).
    ///
    /// Validation deliberately covers only a slice of the split per epoch.
    pub fn from_counts(
        train_samples: usize,
        val_samples: usize,
        batch_size: usize,
        sub_splits: usize,
        epochs: usize,
    ) -> Result<TrainPlan> {
        if batch_size == 0 {
            return Err(Error::config("batch_size must be positive"));
        }
        if sub_splits == 0 {
            return Err(Error::config("validation_sub_splits must be positive"));
        }
        if epochs == 0 {
            return Err(Error::config("epochs must be positive"));
        }
        let steps_per_epoch = train_samples / batch_size;
        if steps_per_epoch == 0 {
            return Err(Error::config(format!(
                "training split of {} samples is smaller than one batch of {}",
                train_samples, batch_size
            )));
        }
        Ok(TrainPlan {
            epochs,
            steps_per_epoch,
            validation_steps: val_samples / batch_size / sub_splits,
            batch_size,
            progress_tx: None,
            stop_flag: None,
        })
    }

    pub fn with_progress(mut self, tx: mpsc::Sender<EpochStats>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = Some(flag);
        self
    }
}
