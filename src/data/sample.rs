use image::{DynamicImage, GrayImage};

use crate::math::tensor::Tensor;

/// One labelled example as the dataset stores it: an image of any size and
/// a single-channel trimap whose labels start at 1.
#[derive(Debug, Clone)]
pub struct RawSample {
    pub image: DynamicImage,
    pub mask: GrayImage,
}

/// Per-pixel class labels, zero-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    pub height: usize,
    pub width: usize,
    pub labels: Vec<u8>,
}

impl LabelMap {
    pub fn new(height: usize, width: usize, labels: Vec<u8>) -> LabelMap {
        assert_eq!(labels.len(), height * width, "label map size mismatch");
        LabelMap { height, width, labels }
    }

    #[inline]
    pub fn get(&self, y: usize, x: usize) -> u8 {
        self.labels[y * self.width + x]
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn flip_horizontal(&self) -> LabelMap {
        let labels = self
            .labels
            .chunks(self.width)
            .flat_map(|row| row.iter().rev().copied())
            .collect();
        LabelMap { height: self.height, width: self.width, labels }
    }

    pub fn flip_vertical(&self) -> LabelMap {
        let labels = self
            .labels
            .chunks(self.width)
            .rev()
            .flat_map(|row| row.iter().copied())
            .collect();
        LabelMap { height: self.height, width: self.width, labels }
    }
}

/// A preprocessed example: image scaled into [0, 1], zero-based labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub image: Tensor,
    pub mask: LabelMap,
}

/// A group of samples handed to one training, evaluation or inference step.
///
/// `weights` carries one loss multiplier per mask pixel and is only present
/// on the training and validation streams.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub images: Vec<Tensor>,
    pub masks: Vec<LabelMap>,
    pub weights: Option<Vec<Vec<f64>>>,
}

impl Batch {
    pub fn from_samples(samples: Vec<Sample>) -> Batch {
        let (images, masks) = samples.into_iter().map(|s| (s.image, s.mask)).unzip();
        Batch { images, masks, weights: None }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
