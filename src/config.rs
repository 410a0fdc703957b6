use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::loss::metrics::Metric;

/// Which optimiser the orchestrator compiles the network with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Adam,
    Sgd,
}

/// The one configuration object for a run.
///
/// Built once (defaults, or `load_json`), validated once, then handed by
/// reference to the assembler, the data pipeline and the orchestrator.
/// Nothing in the crate reads configuration from anywhere else.
///
/// The three split percentages are cumulative cut points over the dataset:
/// train takes `[0, train_percent)`, validation `[train_percent, val_percent)`
/// and test `[val_percent, test_percent)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UNetConfig {
    pub train_percent: u32,
    pub val_percent: u32,
    pub test_percent: u32,

    /// Filter count of the first contracting block.
    pub base_filters: usize,
    /// Number of contracting blocks (the terminal one included).
    pub block_count: usize,
    /// Channels of the final 1×1 projection, i.e. the number of classes.
    pub output_classes: usize,

    pub input_width: usize,
    pub input_height: usize,
    pub input_channels: usize,
    pub mask_width: usize,
    pub mask_height: usize,

    pub shuffle_buffer: usize,
    pub prefetch_buffer: usize,
    /// Raw per-class loss weights; normalised to sum to 1 before use.
    pub class_weights: Vec<f64>,
    pub validation_sub_splits: usize,

    /// Epoch fractions in (0, 1), strictly increasing.
    pub lr_boundaries: Vec<f64>,
    /// One more value than `lr_boundaries`.
    pub lr_values: Vec<f64>,
    pub optimizer: OptimizerKind,
    /// Metrics reported next to the loss for training, validation and test.
    pub metrics: Vec<Metric>,

    pub batch_size: usize,
    pub epochs: usize,

    /// Seed shared by the image and mask views during augmentation.
    pub augment_seed: u64,
    pub shuffle_seed: u64,
    pub init_seed: u64,
    /// How many test batches the inference timer runs over.
    pub inference_batches: usize,

    pub dataset_path: PathBuf,
}

impl Default for UNetConfig {
    fn default() -> Self {
        UNetConfig {
            train_percent: 15,
            val_percent: 20,
            test_percent: 25,
            base_filters: 64,
            block_count: 3,
            output_classes: 3,
            input_width: 100,
            input_height: 100,
            input_channels: 3,
            mask_width: 60,
            mask_height: 60,
            shuffle_buffer: 10,
            prefetch_buffer: 2,
            class_weights: vec![1.0, 1.0, 2.0],
            validation_sub_splits: 5,
            lr_boundaries: vec![0.2, 0.5, 0.8],
            lr_values: vec![3e-4, 1e-4, 1e-5, 1e-6],
            optimizer: OptimizerKind::Adam,
            metrics: vec![Metric::Accuracy],
            batch_size: 4,
            epochs: 2,
            augment_seed: 36,
            shuffle_seed: 7,
            init_seed: 42,
            inference_batches: 10,
            dataset_path: PathBuf::from("data"),
        }
    }
}

impl UNetConfig {
    /// Rejects every configuration that could not produce a training run.
    ///
    /// Geometry compatibility (input size vs. block count) is checked later,
    /// by the assembler, because it needs shape inference.
    pub fn validate(&self) -> Result<()> {
        if self.block_count < 1 {
            return Err(Error::config("block_count must be at least 1"));
        }
        if self.base_filters == 0 {
            return Err(Error::config("base_filters must be at least 1"));
        }
        if self.block_count > 1 && self.base_filters < 2 {
            // Upsampling blocks halve the filter count of their level.
            return Err(Error::config(
                "base_filters must be at least 2 when block_count > 1",
            ));
        }
        if self.output_classes == 0 {
            return Err(Error::config("output_classes must be at least 1"));
        }
        if self.input_width == 0 || self.input_height == 0 || self.input_channels == 0 {
            return Err(Error::config("input geometry must be non-zero"));
        }
        if self.mask_width == 0 || self.mask_height == 0 {
            return Err(Error::config("mask geometry must be non-zero"));
        }
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be positive"));
        }
        if self.epochs == 0 {
            return Err(Error::config("epochs must be positive"));
        }
        if self.shuffle_buffer == 0 {
            return Err(Error::config("shuffle_buffer must be positive"));
        }
        if self.prefetch_buffer == 0 {
            return Err(Error::config("prefetch_buffer must be positive"));
        }
        if self.validation_sub_splits == 0 {
            return Err(Error::config("validation_sub_splits must be positive"));
        }
        if !(self.train_percent <= self.val_percent
            && self.val_percent <= self.test_percent
            && self.test_percent <= 100)
        {
            return Err(Error::config(format!(
                "split percentages must be non-decreasing and at most 100, got {}/{}/{}",
                self.train_percent, self.val_percent, self.test_percent
            )));
        }
        if self.class_weights.len() != self.output_classes {
            return Err(Error::config(format!(
                "expected {} class weights, got {}",
                self.output_classes,
                self.class_weights.len()
            )));
        }
        if self.class_weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::config("class weights must be finite and non-negative"));
        }
        if self.class_weights.iter().sum::<f64>() <= 0.0 {
            return Err(Error::config("class weights must not all be zero"));
        }
        validate_schedule(&self.lr_boundaries, &self.lr_values)
    }

    pub fn input_shape(&self) -> (usize, usize, usize) {
        (self.input_height, self.input_width, self.input_channels)
    }

    pub fn mask_shape(&self) -> (usize, usize) {
        (self.mask_height, self.mask_width)
    }

    pub fn save_json(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Reads and validates a configuration file. Missing keys take defaults.
    pub fn load_json(path: &str) -> Result<UNetConfig> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let config: UNetConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }
}

/// Checks the epoch-fraction boundaries against the rate values.
pub(crate) fn validate_schedule(fractions: &[f64], values: &[f64]) -> Result<()> {
    if values.len() != fractions.len() + 1 {
        return Err(Error::config(format!(
            "learning-rate schedule needs {} values for {} boundaries, got {}",
            fractions.len() + 1,
            fractions.len(),
            values.len()
        )));
    }
    if fractions.iter().any(|f| !(*f > 0.0 && *f < 1.0)) {
        return Err(Error::config("schedule boundaries must lie strictly inside (0, 1)"));
    }
    if fractions.windows(2).any(|w| w[0] >= w[1]) {
        return Err(Error::config("schedule boundaries must be strictly increasing"));
    }
    if values.iter().any(|v| !v.is_finite() || *v <= 0.0) {
        return Err(Error::config("learning rates must be finite and positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        UNetConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_blocks_rejected() {
        let config = UNetConfig { block_count: 0, ..UNetConfig::default() };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn zero_batch_size_rejected() {
        let config = UNetConfig { batch_size: 0, ..UNetConfig::default() };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn schedule_value_count_must_match() {
        let config = UNetConfig {
            lr_values: vec![1e-3, 1e-4],
            ..UNetConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn class_weight_count_must_match_classes() {
        let config = UNetConfig {
            class_weights: vec![1.0, 1.0],
            ..UNetConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn json_round_trip_keeps_defaults_for_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "batch_size": 8, "optimizer": "sgd" }"#).unwrap();

        let config = UNetConfig::load_json(path.to_str().unwrap()).unwrap();
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.optimizer, OptimizerKind::Sgd);
        assert_eq!(config.block_count, 3);
        assert_eq!(config.class_weights, vec![1.0, 1.0, 2.0]);
        assert_eq!(config.metrics, vec![Metric::Accuracy]);
    }

    #[test]
    fn metrics_are_read_by_name() {
        let config: UNetConfig =
            serde_json::from_str(r#"{ "metrics": ["mean_iou", "accuracy"] }"#).unwrap();
        assert_eq!(config.metrics, vec![Metric::MeanIou, Metric::Accuracy]);
        assert!(serde_json::from_str::<UNetConfig>(r#"{ "metrics": ["f1"] }"#).is_err());
    }
}
