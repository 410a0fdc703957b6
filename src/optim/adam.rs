use crate::layers::param::Param;
use crate::optim::Optimizer;
use crate::schedule::LearningRate;

pub const BETA_1: f64 = 0.9;
pub const BETA_2: f64 = 0.999;
pub const EPSILON: f64 = 1e-7;

/// Adam with bias correction folded into the step size:
///
/// ```text
/// t     = iterations + 1
/// alpha = lr(iterations) * sqrt(1 - beta2^t) / (1 - beta1^t)
/// m     = beta1 * m + (1 - beta1) * g
/// v     = beta2 * v + (1 - beta2) * g^2
/// x    -= alpha * m / (sqrt(v) + epsilon)
/// ```
pub struct Adam {
    schedule: Box<dyn LearningRate>,
    beta_1: f64,
    beta_2: f64,
    epsilon: f64,
    iterations: usize,
    m: Vec<Vec<f64>>,
    v: Vec<Vec<f64>>,
}

impl Adam {
    pub fn new(schedule: Box<dyn LearningRate>) -> Adam {
        Adam {
            schedule,
            beta_1: BETA_1,
            beta_2: BETA_2,
            epsilon: EPSILON,
            iterations: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    /// Allocates moment buffers on the first step (or if the parameter set
    /// changed shape).
    fn ensure_moments(&mut self, params: &[&mut Param]) {
        let fits = self.m.len() == params.len()
            && self.m.iter().zip(params.iter()).all(|(m, p)| m.len() == p.len());
        if !fits {
            self.m = params.iter().map(|p| vec![0.0; p.len()]).collect();
            self.v = self.m.clone();
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [&mut Param]) -> f64 {
        self.ensure_moments(params);
        let lr = self.schedule.rate_at(self.iterations);
        let t = (self.iterations + 1) as i32;
        let alpha = lr * (1.0 - self.beta_2.powi(t)).sqrt() / (1.0 - self.beta_1.powi(t));
        let (b1, b2, eps) = (self.beta_1, self.beta_2, self.epsilon);

        for ((param, m), v) in params.iter_mut().zip(self.m.iter_mut()).zip(self.v.iter_mut()) {
            let (value, grad) = param.value_and_grad_mut();
            let moments = m.iter_mut().zip(v.iter_mut());
            for ((x, &g), (m, v)) in value.iter_mut().zip(grad.iter()).zip(moments) {
                *m += (g - *m) * (1.0 - b1);
                *v += (g * g - *v) * (1.0 - b2);
                *x -= alpha * *m / (v.sqrt() + eps);
            }
        }
        self.iterations += 1;
        lr
    }

    fn iterations(&self) -> usize {
        self.iterations
    }

    fn learning_rate(&self) -> f64 {
        self.schedule.rate_at(self.iterations)
    }

    fn name(&self) -> &'static str {
        "adam"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Constant;

    #[test]
    fn first_step_moves_by_learning_rate() {
        // With bias correction the first update is lr * g / (|g| + eps').
        let mut p = Param::new(vec![1.0, 1.0]);
        p.grad_mut().copy_from_slice(&[4.0, -0.5]);
        let mut adam = Adam::new(Box::new(Constant(0.01)));
        adam.step(&mut [&mut p]);
        assert!((p.value[0] - 0.99).abs() < 1e-6);
        assert!((p.value[1] - 1.01).abs() < 1e-6);
    }

    #[test]
    fn minimises_a_quadratic() {
        let mut p = Param::new(vec![3.0]);
        let mut adam = Adam::new(Box::new(Constant(0.1)));
        for _ in 0..500 {
            let x = p.value[0];
            p.grad_mut()[0] = 2.0 * (x - 1.0);
            adam.step(&mut [&mut p]);
        }
        assert!((p.value[0] - 1.0).abs() < 5e-2);
        assert_eq!(adam.iterations(), 500);
    }

    #[test]
    fn zero_gradient_leaves_params() {
        let mut p = Param::new(vec![0.25]);
        let mut adam = Adam::new(Box::new(Constant(0.1)));
        adam.step(&mut [&mut p]);
        assert_eq!(p.value[0], 0.25);
    }
}
