use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};
use crate::layers::param::Param;
use crate::math::tensor::{he_normal, Shape, Tensor};

/// Square "valid" convolution with stride 1: every spatial dimension
/// shrinks by `kernel - 1`.
///
/// Weights are laid out `[ky][kx][in_channel][out_channel]` so the inner
/// loop walks a contiguous row of output channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conv2d {
    pub kernel: usize,
    pub in_channels: usize,
    pub out_channels: usize,
    pub weights: Param,
    pub biases: Param,
}

impl Conv2d {
    pub fn new<R: Rng + ?Sized>(
        kernel: usize,
        in_channels: usize,
        out_channels: usize,
        rng: &mut R,
    ) -> Conv2d {
        let fan_in = kernel * kernel * in_channels;
        Conv2d {
            kernel,
            in_channels,
            out_channels,
            weights: Param::new(he_normal(fan_in * out_channels, fan_in, rng)),
            biases: Param::zeros(out_channels),
        }
    }

    pub fn output_shape(&self, input: Shape) -> Result<Shape> {
        if input.channels != self.in_channels {
            return Err(Error::shape(format!(
                "conv expects {} input channels, got {}",
                self.in_channels, input.channels
            )));
        }
        if input.height < self.kernel || input.width < self.kernel {
            return Err(Error::shape(format!(
                "{}x{} convolution cannot run on a {}x{} map",
                self.kernel, self.kernel, input.height, input.width
            )));
        }
        Ok(Shape::new(
            input.height - self.kernel + 1,
            input.width - self.kernel + 1,
            self.out_channels,
        ))
    }

    pub fn param_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    #[inline]
    fn row(&self, ky: usize, kx: usize, ci: usize) -> usize {
        ((ky * self.kernel + kx) * self.in_channels + ci) * self.out_channels
    }

    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let shape = self.output_shape(input.shape())?;
        let mut out = Tensor::zeros(shape);
        let cout = self.out_channels;

        for oy in 0..shape.height {
            for ox in 0..shape.width {
                let base = out.offset(oy, ox, 0);
                let acc = &mut out.data[base..base + cout];
                acc.copy_from_slice(&self.biases.value);

                for ky in 0..self.kernel {
                    for kx in 0..self.kernel {
                        let px = input.pixel(oy + ky, ox + kx);
                        for (ci, &xv) in px.iter().enumerate() {
                            if xv == 0.0 {
                                continue;
                            }
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
        let cout = self.out_channels;
        let kernel = self.kernel;
        let cin = self.in_channels;

        for oy in 0..grad_output.height {
            for ox in 0..grad_output.width {
                let g = grad_output.pixel(oy, ox);

                for (b, &gv) in self.biases.grad_mut().iter_mut().zip(g) {
                    *b += gv;
                }

                for ky in 0..kernel {
                    for kx in 0..kernel {
                        for ci in 0..cin {
                            let xv = input.get(oy + ky, ox + kx, ci);
                            let row = ((ky * kernel + kx) * cin + ci) * cout;

                            let w = &self.weights.value[row..row + cout];
                            let gi: f64 = w.iter().zip(g).map(|(wv, gv)| wv * gv).sum();
                            *grad_input.get_mut(oy + ky, ox + kx, ci) += gi;

                            if xv != 0.0 {
                                let wg = &mut self.weights.grad_mut()[row..row + cout];
                                for (wgv, &gv) in wg.iter_mut().zip(g) {
                                    *wgv += xv * gv;
                                }
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

    fn conv_with(kernel: usize, cin: usize, cout: usize, weights: Vec<f64>, biases: Vec<f64>) -> Conv2d {
        let mut conv = Conv2d::new(kernel, cin, cout, &mut StdRng::seed_from_u64(0));
        conv.weights = Param::new(weights);
        conv.biases = Param::new(biases);
        conv
    }

    #[test]
    fn valid_conv_shrinks_by_kernel_minus_one() {
        let conv = Conv2d::new(3, 2, 5, &mut StdRng::seed_from_u64(0));
        assert_eq!(conv.output_shape(Shape::new(10, 7, 2)).unwrap(), Shape::new(8, 5, 5));
        assert!(conv.output_shape(Shape::new(2, 7, 2)).is_err());
        assert!(conv.output_shape(Shape::new(10, 7, 3)).is_err());
    }

    #[test]
    fn box_filter_sums_window() {
        let conv = conv_with(2, 1, 1, vec![1.0; 4], vec![0.5]);
        let input = Tensor::from_data(Shape::new(2, 3, 1), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let out = conv.forward(&input).unwrap();
        assert_eq!(out.shape(), Shape::new(1, 2, 1));
        assert_eq!(out.data, vec![12.5, 16.5]);
    }

    #[test]
    fn backward_matches_finite_differences() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut conv = Conv2d::new(3, 2, 2, &mut rng);
        let input = Tensor::from_data(
            Shape::new(4, 4, 2),
            he_normal(32, 1, &mut rng),
        )
        .unwrap();

        // L = sum(output), so ∂L/∂output is all ones.
        let out = conv.forward(&input).unwrap();
        let ones = out.map(|_| 1.0);
        let grad_input = conv.backward(&input, &ones);

        let eps = 1e-6;
        for idx in [0, 7, 19, 31] {
            let mut plus = input.clone();
            plus.data[idx] += eps;
            let mut minus = input.clone();
            minus.data[idx] -= eps;
            let numeric = (conv.forward(&plus).unwrap().data.iter().sum::<f64>()
                - conv.forward(&minus).unwrap().data.iter().sum::<f64>())
                / (2.0 * eps);
            assert!((numeric - grad_input.data[idx]).abs() < 1e-5);
        }

        let w0 = conv.weights.grad()[0];
        let mut bumped = conv.clone();
        bumped.weights.value[0] += eps;
        let numeric = (bumped.forward(&input).unwrap().data.iter().sum::<f64>()
            - out.data.iter().sum::<f64>())
            / eps;
        assert!((numeric - w0).abs() < 1e-4);
        assert_eq!(conv.biases.grad(), &[4.0, 4.0]);
    }
}
