use image::imageops::{self, FilterType};
use image::GenericImageView;

use crate::config::UNetConfig;
use crate::data::sample::{LabelMap, RawSample, Sample};
use crate::error::{Error, Result};
use crate::math::tensor::{Shape, Tensor};

/// Resizes the image to the network input geometry and the mask to the
/// (smaller) output geometry.
///
/// Images are resampled bilinearly; masks use nearest-neighbour so every
/// pixel keeps a real class label.
pub fn resize_sample(raw: &RawSample, config: &UNetConfig) -> RawSample {
    let image = raw.image.resize_exact(
        config.input_width as u32,
        config.input_height as u32,
        FilterType::Triangle,
    );
    let mask = imageops::resize(
        &raw.mask,
        config.mask_width as u32,
        config.mask_height as u32,
        FilterType::Nearest,
    );
    RawSample { image, mask }
}

/// Scales pixels by 1/255 and shifts trimap labels from 1-based to 0-based.
///
/// Consumes the raw sample, so a sample cannot be normalised twice. A raw
/// label of 0 means the mask was already shifted (or is corrupt) and is
/// rejected.
pub fn normalize_sample(raw: RawSample, channels: usize) -> Result<Sample> {
    let (width, height) = raw.image.dimensions();
    let (width, height) = (width as usize, height as usize);
    let bytes: Vec<u8> = match channels {
        1 => raw.image.to_luma8().into_raw(),
        3 => raw.image.to_rgb8().into_raw(),
        other => {
            return Err(Error::config(format!(
                "images must have 1 or 3 channels, configured {}",
                other
            )))
        }
    };
    let image = Tensor::from_data(
        Shape::new(height, width, channels),
        bytes.iter().map(|&p| p as f64 / 255.0).collect(),
    )?;

    let (mask_w, mask_h) = raw.mask.dimensions();
    let labels = raw
        .mask
        .into_raw()
        .into_iter()
        .map(|l| {
            l.checked_sub(1)
                .ok_or_else(|| Error::data("raw mask label 0; trimap labels start at 1"))
        })
        .collect::<Result<Vec<u8>>>()?;

    Ok(Sample {
        image,
        mask: LabelMap::new(mask_h as usize, mask_w as usize, labels),
    })
}

/// Resize, then normalise.
pub fn preprocess_sample(raw: RawSample, config: &UNetConfig) -> Result<Sample> {
    normalize_sample(resize_sample(&raw, config), config.input_channels)
}
