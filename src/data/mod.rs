pub mod augment;
pub mod dataset;
pub mod pipeline;
pub mod preprocess;
pub mod sample;
pub mod weights;

pub use augment::{augment_pair, Augmenter, FlipPlan};
pub use dataset::{DatasetSource, PetDataset, SplitSources, Splits, Subset, VecSource};
pub use pipeline::{BatchStream, DataPipeline};
pub use preprocess::{normalize_sample, preprocess_sample, resize_sample};
pub use sample::{Batch, LabelMap, RawSample, Sample};
pub use weights::ClassWeights;
