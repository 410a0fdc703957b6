use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::config::UNetConfig;
use crate::data::sample::RawSample;
use crate::error::{Error, Result};

/// A finite, randomly addressable collection of labelled images.
///
/// Samples are produced on demand; nothing is decoded until `get` runs.
pub trait DatasetSource: Send + Sync {
    fn len(&self) -> usize;

    fn get(&self, index: usize) -> Result<RawSample>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lazily yields every sample of `source` in index order.
pub fn samples(source: Arc<dyn DatasetSource>) -> impl Iterator<Item = Result<RawSample>> + Send {
    (0..source.len()).map(move |i| source.get(i))
}

/// Samples already held in memory.
pub struct VecSource {
    samples: Vec<RawSample>,
}

impl VecSource {
    pub fn new(samples: Vec<RawSample>) -> VecSource {
        VecSource { samples }
    }
}

impl DatasetSource for VecSource {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Result<RawSample> {
        self.samples
            .get(index)
            .cloned()
            .ok_or_else(|| Error::data(format!("sample {} out of range", index)))
    }
}

/// The Oxford-IIIT Pet directory layout:
/// `images/<stem>.jpg` paired with `annotations/trimaps/<stem>.png`.
///
/// Trimap labels are 1 (pet), 2 (background) and 3 (border).
pub struct PetDataset {
    images_dir: PathBuf,
    trimaps_dir: PathBuf,
    stems: Vec<String>,
}

impl PetDataset {
    /// Indexes every image that has a matching trimap, sorted by name. A
    /// stem present under several image extensions is indexed once.
    pub fn open(root: &Path) -> Result<PetDataset> {
        let images_dir = root.join("images");
        let trimaps_dir = root.join("annotations").join("trimaps");

        let mut stems = Vec::new();
        for entry in std::fs::read_dir(&images_dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"))
                .unwrap_or(false);
            if !is_image {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if trimaps_dir.join(format!("{stem}.png")).is_file() {
                    stems.push(stem.to_string());
                }
            }
        }
        if stems.is_empty() {
            return Err(Error::data(format!(
                "no image/trimap pairs found under {}",
                root.display()
            )));
        }
        stems.sort();
        stems.dedup();
        info!(root = %root.display(), samples = stems.len(), "indexed dataset");

        Ok(PetDataset { images_dir, trimaps_dir, stems })
    }

    fn image_path(&self, stem: &str) -> Result<PathBuf> {
        ["jpg", "jpeg", "png", "JPG", "JPEG", "PNG"]
            .iter()
            .map(|ext| self.images_dir.join(format!("{stem}.{ext}")))
            .find(|p| p.is_file())
            .ok_or_else(|| Error::data(format!("image for '{}' disappeared", stem)))
    }
}

impl DatasetSource for PetDataset {
    fn len(&self) -> usize {
        self.stems.len()
    }

    fn get(&self, index: usize) -> Result<RawSample> {
        let stem = self
            .stems
            .get(index)
            .ok_or_else(|| Error::data(format!("sample {} out of range", index)))?;
        let image = image::open(self.image_path(stem)?)?;
        let mask = image::open(self.trimaps_dir.join(format!("{stem}.png")))?.to_luma8();
        Ok(RawSample { image, mask })
    }
}

/// A contiguous window of another source.
pub struct Subset {
    source: Arc<dyn DatasetSource>,
    range: Range<usize>,
}

impl Subset {
    pub fn new(source: Arc<dyn DatasetSource>, range: Range<usize>) -> Result<Subset> {
        if range.start > range.end || range.end > source.len() {
            return Err(Error::data(format!(
                "range {:?} does not fit a source of {} samples",
                range,
                source.len()
            )));
        }
        Ok(Subset { source, range })
    }
}

impl DatasetSource for Subset {
    fn len(&self) -> usize {
        self.range.len()
    }

    fn get(&self, index: usize) -> Result<RawSample> {
        if index >= self.range.len() {
            return Err(Error::data(format!("sample {} out of range", index)));
        }
        self.source.get(self.range.start + index)
    }
}

/// Index windows of the three splits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Splits {
    pub train: Range<usize>,
    pub validation: Range<usize>,
    pub test: Range<usize>,
}

impl Splits {
    /// Cuts `len` samples at the cumulative percentages `train`, `val` and
    /// `test`: `[0, train%)`, `[train%, val%)`, `[val%, test%)`.
    pub fn from_percentages(len: usize, train: u32, val: u32, test: u32) -> Result<Splits> {
        if !(train <= val && val <= test && test <= 100) {
            return Err(Error::config(format!(
                "split percentages must be non-decreasing and at most 100, got {}/{}/{}",
                train, val, test
            )));
        }
        let cut = |p: u32| len * p as usize / 100;
        Ok(Splits {
            train: 0..cut(train),
            validation: cut(train)..cut(val),
            test: cut(val)..cut(test),
        })
    }
}

/// The three split views of one source, plus their sample counts.
pub struct SplitSources {
    pub train: Arc<dyn DatasetSource>,
    pub validation: Arc<dyn DatasetSource>,
    pub test: Arc<dyn DatasetSource>,
}

impl SplitSources {
    pub fn new(source: Arc<dyn DatasetSource>, config: &UNetConfig) -> Result<SplitSources> {
        let splits = Splits::from_percentages(
            source.len(),
            config.train_percent,
            config.val_percent,
            config.test_percent,
        )?;
        info!(
            train = splits.train.len(),
            validation = splits.validation.len(),
            test = splits.test.len(),
            "split dataset"
        );
        Ok(SplitSources {
            train: Arc::new(Subset::new(source.clone(), splits.train)?),
            validation: Arc::new(Subset::new(source.clone(), splits.validation)?),
            test: Arc::new(Subset::new(source, splits.test)?),
        })
    }
}
