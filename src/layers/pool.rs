use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};
use crate::math::tensor::{Shape, Tensor};

/// Non-overlapping max pooling (window = stride = `size`). Trailing rows or
/// columns that do not fill a window are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxPool2d {
    pub size: usize,
}

impl Default for MaxPool2d {
    fn default() -> Self {
        MaxPool2d { size: 2 }
    }
}

impl MaxPool2d {
    pub fn output_shape(&self, input: Shape) -> Result<Shape> {
        let shape = Shape::new(input.height / self.size, input.width / self.size, input.channels);
        if shape.height == 0 || shape.width == 0 {
            return Err(Error::shape(format!(
                "{}x{} pooling cannot run on a {}x{} map",
                self.size, self.size, input.height, input.width
            )));
        }
        Ok(shape)
    }

    /// Position of the window maximum; the first one wins on ties.
    fn argmax(&self, input: &Tensor, oy: usize, ox: usize, c: usize) -> (usize, usize) {
        let mut best = (oy * self.size, ox * self.size);
        let mut best_val = f64::NEG_INFINITY;
        for dy in 0..self.size {
            for dx in 0..self.size {
                let (y, x) = (oy * self.size + dy, ox * self.size + dx);
                let v = input.get(y, x, c);
                if v > best_val {
                    best_val = v;
                    best = (y, x);
                }
            }
        }
        best
    }

    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let shape = self.output_shape(input.shape())?;
        let mut out = Tensor::zeros(shape);
        for oy in 0..shape.height {
            for ox in 0..shape.width {
                for c in 0..shape.channels {
                    let (y, x) = self.argmax(input, oy, ox, c);
                    *out.get_mut(oy, ox, c) = input.get(y, x, c);
                }
            }
        }
        Ok(out)
    }

    /// Routes each output gradient back to the input position that won the
    /// window.
    pub fn backward(&self, input: &Tensor, grad_output: &Tensor) -> Tensor {
        let mut grad_input = Tensor::zeros(input.shape());
        for oy in 0..grad_output.height {
            for ox in 0..grad_output.width {
                for c in 0..grad_output.channels {
                    let (y, x) = self.argmax(input, oy, ox, c);
                    *grad_input.get_mut(y, x, c) += grad_output.get(oy, ox, c);
                }
            }
        }
        grad_input
    }
}
