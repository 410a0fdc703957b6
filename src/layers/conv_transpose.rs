use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};
use crate::layers::param::Param;
use crate::math::tensor::{he_normal, Shape, Tensor};

/// Learned upsampling: a transposed convolution whose kernel equals its
/// stride, so every input pixel expands into its own `stride × stride`
/// patch and each spatial dimension is multiplied by `stride`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvTranspose2d {
    pub stride: usize,
    pub in_channels: usize,
    pub out_channels: usize,
    pub weights: Param,
    pub biases: Param,
}

impl ConvTranspose2d {
    pub fn new<R: Rng + ?Sized>(
        stride: usize,
        in_channels: usize,
        out_channels: usize,
        rng: &mut R,
    ) -> ConvTranspose2d {
        let fan_in = stride * stride * in_channels;
        ConvTranspose2d {
            stride,
            in_channels,
            out_channels,
            weights: Param::new(he_normal(fan_in * out_channels, fan_in, rng)),
            biases: Param::zeros(out_channels),
        }
    }

    pub fn output_shape(&self, input: Shape) -> Result<Shape> {
        if input.channels != self.in_channels {
            return Err(Error::shape(format!(
                "transposed conv expects {} input channels, got {}",
                self.in_channels, input.channels
            )));
        }
        Ok(Shape::new(
            input.height * self.stride,
            input.width * self.stride,
            self.out_channels,
        ))
    }

    pub fn param_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    #[inline]
    fn row(&self, ky: usize, kx: usize, ci: usize) -> usize {
        ((ky * self.stride + kx) * self.in_channels + ci) * self.out_channels
    }

    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let shape = self.output_shape(input.shape())?;
        let mut out = Tensor::zeros(shape);
        let cout = self.out_channels;

        for y in 0..input.height {
            for x in 0..input.width {
                let px = input.pixel(y, x);
                for ky in 0..self.stride {
                    for kx in 0..self.stride {
                        let base = out.offset(y * self.stride + ky, x * self.stride + kx, 0);
                        let acc = &mut out.data[base..base + cout];
                        acc.copy_from_slice(&self.biases.value);
                        for (ci, &xv) in px.iter().enumerate() {
                            let row = self.row(ky, kx, ci);
                            let w = &self.weights.value[row..row + cout];
                            for (a, &wv) in acc.iter_mut().zip(w) {
                                *a += xv * wv;
                            }
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    /// Accumulates ∂L/∂W and ∂L/∂b and returns ∂L/∂input.
    pub fn backward(&mut self, input: &Tensor, grad_output: &Tensor) -> Tensor {
        let mut grad_input = Tensor::zeros(input.shape());
        let stride = self.stride;
        let cin = self.in_channels;
        let cout = self.out_channels;

        for y in 0..input.height {
            for x in 0..input.width {
                for ky in 0..stride {
                    for kx in 0..stride {
                        let g = grad_output.pixel(y * stride + ky, x * stride + kx);
                        for (b, &gv) in self.biases.grad_mut().iter_mut().zip(g) {
                            *b += gv;
                        }
                        for ci in 0..cin {
                            let xv = input.get(y, x, ci);
                            let row = ((ky * stride + kx) * cin + ci) * cout;

                            let w = &self.weights.value[row..row + cout];
                            let gi: f64 = w.iter().zip(g).map(|(wv, gv)| wv * gv).sum();
                            *grad_input.get_mut(y, x, ci) += gi;

                            let wg = &mut self.weights.grad_mut()[row..row + cout];
                            for (wgv, &gv) in wg.iter_mut().zip(g) {
                                *wgv += xv * gv;
                            }
                        }
                    }
                }
            }
        }
        grad_input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn doubles_spatial_dims() {
        let up = ConvTranspose2d::new(2, 8, 4, &mut StdRng::seed_from_u64(0));
        assert_eq!(up.output_shape(Shape::new(18, 18, 8)).unwrap(), Shape::new(36, 36, 4));
    }

    #[test]
    fn each_pixel_expands_into_its_own_patch() {
        let mut up = ConvTranspose2d::new(2, 1, 1, &mut StdRng::seed_from_u64(0));
        up.weights = Param::new(vec![1.0, 2.0, 3.0, 4.0]);
        up.biases = Param::new(vec![0.0]);
        let input = Tensor::from_data(Shape::new(1, 2, 1), vec![1.0, 10.0]).unwrap();
        let out = up.forward(&input).unwrap();
        assert_eq!(out.shape(), Shape::new(2, 4, 1));
        assert_eq!(out.data, vec![1.0, 2.0, 10.0, 20.0, 3.0, 4.0, 30.0, 40.0]);

        let grad = out.map(|_| 1.0);
        let back = up.backward(&input, &grad);
        assert_eq!(back.data, vec![10.0, 10.0]);
        assert_eq!(up.weights.grad(), &[11.0, 11.0, 11.0, 11.0]);
        assert_eq!(up.biases.grad(), &[8.0]);
    }
}
