use serde::{Serialize, Deserialize};

use crate::math::tensor::Tensor;

/// Element-wise nonlinearity applied after each convolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ActivationFunction {
    ReLU,
}

impl ActivationFunction {
    pub fn function(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::ReLU => if x > 0.0 { x } else { 0.0 },
        }
    }

    /// Derivative expressed in terms of the *output* `y = f(x)`.
    ///
    /// ReLU is monotone and keeps the sign of `x`, so the output alone is
    /// enough and the graph never has to keep pre-activations.
    pub fn derivative_from_output(&self, y: f64) -> f64 {
        match self {
            ActivationFunction::ReLU => if y > 0.0 { 1.0 } else { 0.0 },
        }
    }

    pub fn forward(&self, input: &Tensor) -> Tensor {
        input.map(|x| self.function(x))
    }

    /// Gradient w.r.t. the input, given the forward output and ∂L/∂output.
    pub fn backward(&self, output: &Tensor, grad_output: &Tensor) -> Tensor {
        let mut grad = grad_output.clone();
        for (g, &y) in grad.data.iter_mut().zip(output.data.iter()) {
            *g *= self.derivative_from_output(y);
        }
        grad
    }

    /// Label shown in the graph summary.
    pub fn name(&self) -> &'static str {
        match self {
            ActivationFunction::ReLU => "ReLU",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tensor::Shape;

    #[test]
    fn relu_zeroes_negative_gradient() {
        let input = Tensor::from_data(Shape::new(1, 3, 1), vec![-1.0, 0.5, 2.0]).unwrap();
        let out = ActivationFunction::ReLU.forward(&input);
        assert_eq!(out.data, vec![0.0, 0.5, 2.0]);

        let grad = Tensor::from_data(Shape::new(1, 3, 1), vec![1.0, 1.0, 1.0]).unwrap();
        let back = ActivationFunction::ReLU.backward(&out, &grad);
        assert_eq!(back.data, vec![0.0, 1.0, 1.0]);
    }

    #[test]
    fn zero_output_has_zero_slope() {
        let act = ActivationFunction::ReLU;
        assert_eq!(act.function(-2.0), 0.0);
        assert_eq!(act.derivative_from_output(act.function(-2.0)), 0.0);
        assert_eq!(act.derivative_from_output(act.function(3.0)), 1.0);
    }
}
