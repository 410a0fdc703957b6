use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::data::sample::{Batch, LabelMap};
use crate::math::tensor::Tensor;

/// Which flips one sample receives. Drawn once, replayed on both the image
/// and its mask so the two views stay pixel-aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlipPlan {
    pub horizontal: bool,
    pub vertical: bool,
}

impl FlipPlan {
    pub fn draw<R: Rng + ?Sized>(rng: &mut R) -> FlipPlan {
        FlipPlan {
            horizontal: rng.gen_bool(0.5),
            vertical: rng.gen_bool(0.5),
        }
    }

    pub fn from_seed(seed: u64) -> FlipPlan {
        FlipPlan::draw(&mut StdRng::seed_from_u64(seed))
    }

    pub fn apply_image(&self, image: &Tensor) -> Tensor {
        let mut out = if self.horizontal { image.flip_horizontal() } else { image.clone() };
        if self.vertical {
            out = out.flip_vertical();
        }
        out
    }

    pub fn apply_mask(&self, mask: &LabelMap) -> LabelMap {
        let mut out = if self.horizontal { mask.flip_horizontal() } else { mask.clone() };
        if self.vertical {
            out = out.flip_vertical();
        }
        out
    }
}

/// Flips an image and its mask with the plan derived from `seed`.
pub fn augment_pair(seed: u64, image: &Tensor, mask: &LabelMap) -> (Tensor, LabelMap) {
    let plan = FlipPlan::from_seed(seed);
    (plan.apply_image(image), plan.apply_mask(mask))
}

/// Random horizontal/vertical flips over a stream of batches.
///
/// One seeded generator draws a plan per sample; the plan is then applied to
/// both views, so image and mask never disagree.
pub struct Augmenter {
    rng: StdRng,
}

impl Augmenter {
    pub fn new(seed: u64) -> Augmenter {
        Augmenter { rng: StdRng::seed_from_u64(seed) }
    }

    pub fn augment_batch(&mut self, batch: Batch) -> Batch {
        let Batch { images, masks, weights } = batch;
        let (images, masks) = images
            .iter()
            .zip(masks.iter())
            .map(|(image, mask)| {
                let plan = FlipPlan::draw(&mut self.rng);
                (plan.apply_image(image), plan.apply_mask(mask))
            })
            .unzip();
        Batch { images, masks, weights }
    }
}
