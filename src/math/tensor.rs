use rand::Rng;
use serde::{Serialize, Deserialize};
use std::f64::consts::PI;
use std::fmt;
use std::ops::AddAssign;

use crate::error::{Error, Result};

/// Spatial extent plus channel depth of a feature map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl Shape {
    pub fn new(height: usize, width: usize, channels: usize) -> Shape {
        Shape { height, width, channels }
    }

    pub fn len(&self) -> usize {
        self.height * self.width * self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.height, self.width, self.channels)
    }
}

/// A feature map: `height × width × channels` values stored in HWC order,
/// i.e. all channels of a pixel are contiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub data: Vec<f64>,
}

impl Tensor {
    pub fn zeros(shape: Shape) -> Tensor {
        Tensor {
            height: shape.height,
            width: shape.width,
            channels: shape.channels,
            data: vec![0.0; shape.len()],
        }
    }

    pub fn from_data(shape: Shape, data: Vec<f64>) -> Result<Tensor> {
        if data.len() != shape.len() {
            return Err(Error::shape(format!(
                "tensor {} needs {} values, got {}",
                shape,
                shape.len(),
                data.len()
            )));
        }
        Ok(Tensor {
            height: shape.height,
            width: shape.width,
            channels: shape.channels,
            data,
        })
    }

    pub fn shape(&self) -> Shape {
        Shape::new(self.height, self.width, self.channels)
    }

    #[inline]
    pub fn offset(&self, y: usize, x: usize, c: usize) -> usize {
        (y * self.width + x) * self.channels + c
    }

    #[inline]
    pub fn get(&self, y: usize, x: usize, c: usize) -> f64 {
        self.data[self.offset(y, x, c)]
    }

    #[inline]
    pub fn get_mut(&mut self, y: usize, x: usize, c: usize) -> &mut f64 {
        let i = self.offset(y, x, c);
        &mut self.data[i]
    }

    /// The channel vector of one pixel.
    pub fn pixel(&self, y: usize, x: usize) -> &[f64] {
        let start = self.offset(y, x, 0);
        &self.data[start..start + self.channels]
    }

    pub fn map<F>(&self, functor: F) -> Tensor
    where
        F: Fn(f64) -> f64,
    {
        Tensor {
            height: self.height,
            width: self.width,
            channels: self.channels,
            data: self.data.iter().map(|&x| functor(x)).collect(),
        }
    }

    /// Mirrors the tensor left to right.
    pub fn flip_horizontal(&self) -> Tensor {
        let mut res = Tensor::zeros(self.shape());
        for y in 0..self.height {
            for x in 0..self.width {
                let src = self.offset(y, self.width - 1 - x, 0);
                let dst = res.offset(y, x, 0);
                res.data[dst..dst + self.channels]
                    .copy_from_slice(&self.data[src..src + self.channels]);
            }
        }
        res
    }

    /// Mirrors the tensor top to bottom.
    pub fn flip_vertical(&self) -> Tensor {
        let row = self.width * self.channels;
        let mut res = Tensor::zeros(self.shape());
        for y in 0..self.height {
            let src = (self.height - 1 - y) * row;
            res.data[y * row..(y + 1) * row].copy_from_slice(&self.data[src..src + row]);
        }
        res
    }
}

impl AddAssign<&Tensor> for Tensor {
    fn add_assign(&mut self, rhs: &Tensor) {
        if self.shape() != rhs.shape() {
            panic!("Tensors are of incorrect sizes: {} vs {}", self.shape(), rhs.shape())
        }
        for (a, b) in self.data.iter_mut().zip(rhs.data.iter()) {
            *a += b;
        }
    }
}

/// Samples a single value from N(0, 1) using the Box-Muller transform.
/// Both u1 and u2 must be uniform on (0, 1].
fn sample_standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // Draw two independent uniform samples in (0, 1] to avoid log(0).
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = 1.0 - rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Standard deviation of N(0, 1) truncated to [-2, 2].
const TRUNCATED_STD: f64 = 0.879_625_661_034_239_8;

/// He initialization: `len` samples with mean 0 and variance `2 / fan_in`.
///
/// Recommended before ReLU layers. The variance 2/fan_in accounts for
/// the fact that ReLU zeroes half of its inputs on average. Draws beyond two
/// standard deviations are resampled, and the scale is widened by
/// `1 / TRUNCATED_STD` so the truncation does not shrink the variance.
pub fn he_normal<R: Rng + ?Sized>(len: usize, fan_in: usize, rng: &mut R) -> Vec<f64> {
    let std_dev = (2.0 / fan_in.max(1) as f64).sqrt() / TRUNCATED_STD;
    (0..len)
        .map(|_| loop {
            let z = sample_standard_normal(rng);
            if z.abs() <= 2.0 {
                break z * std_dev;
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn ramp(shape: Shape) -> Tensor {
        Tensor::from_data(shape, (0..shape.len()).map(|v| v as f64).collect()).unwrap()
    }

    #[test]
    fn from_data_checks_length() {
        assert!(Tensor::from_data(Shape::new(2, 2, 1), vec![0.0; 3]).is_err());
    }

    #[test]
    fn hwc_layout() {
        let t = ramp(Shape::new(2, 3, 2));
        assert_eq!(t.get(0, 1, 0), 2.0);
        assert_eq!(t.get(1, 0, 1), 7.0);
        assert_eq!(t.pixel(1, 2), &[10.0, 11.0]);
    }

    #[test]
    fn flips_are_involutions() {
        let t = ramp(Shape::new(3, 4, 2));
        assert_eq!(t.flip_horizontal().flip_horizontal(), t);
        assert_eq!(t.flip_vertical().flip_vertical(), t);
        assert_eq!(t.flip_horizontal().get(0, 0, 1), t.get(0, 3, 1));
        assert_eq!(t.flip_vertical().get(0, 2, 0), t.get(2, 2, 0));
    }

    #[test]
    fn he_normal_is_seeded_and_bounded() {
        let a = he_normal(500, 8, &mut StdRng::seed_from_u64(1));
        let b = he_normal(500, 8, &mut StdRng::seed_from_u64(1));
        assert_eq!(a, b);
        let bound = 2.0 * (2.0f64 / 8.0).sqrt() / TRUNCATED_STD;
        assert!(a.iter().all(|v| v.abs() <= bound + 1e-12));
    }

    #[test]
    fn he_normal_variance_is_two_over_fan_in() {
        let n = 40_000;
        let w = he_normal(n, 8, &mut StdRng::seed_from_u64(3));
        let mean = w.iter().sum::<f64>() / n as f64;
        let var = w.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.01, "mean {mean}");
        assert!((var - 0.25).abs() < 0.25 * 0.04, "variance {var}");
    }
}
