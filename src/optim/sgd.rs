use crate::layers::param::Param;
use crate::optim::Optimizer;
use crate::schedule::LearningRate;

/// Plain gradient descent: `value -= lr * grad`.
pub struct Sgd {
    schedule: Box<dyn LearningRate>,
    iterations: usize,
}

impl Sgd {
    pub fn new(schedule: Box<dyn LearningRate>) -> Sgd {
        Sgd { schedule, iterations: 0 }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut [&mut Param]) -> f64 {
        let lr = self.schedule.rate_at(self.iterations);
        for param in params.iter_mut() {
            let (value, grad) = param.value_and_grad_mut();
            for (v, g) in value.iter_mut().zip(grad.iter()) {
                *v -= lr * g;
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
        "sgd"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{Constant, PiecewiseConstant};

    #[test]
    fn descends_along_gradient() {
        let mut p = Param::new(vec![1.0, -2.0]);
        p.grad_mut().copy_from_slice(&[0.5, -1.0]);
        let mut sgd = Sgd::new(Box::new(Constant(0.1)));
        assert_eq!(sgd.step(&mut [&mut p]), 0.1);
        assert!((p.value[0] - 0.95).abs() < 1e-12);
        assert!((p.value[1] + 1.9).abs() < 1e-12);
        assert_eq!(sgd.iterations(), 1);
    }

    #[test]
    fn follows_schedule() {
        let schedule = PiecewiseConstant::new(vec![1], vec![0.5, 0.1]).unwrap();
        let mut sgd = Sgd::new(Box::new(schedule));
        let mut p = Param::new(vec![0.0]);
        p.grad_mut()[0] = 1.0;
        assert_eq!(sgd.step(&mut [&mut p]), 0.5);
        assert_eq!(sgd.learning_rate(), 0.1);
        assert_eq!(sgd.step(&mut [&mut p]), 0.1);
        assert!((p.value[0] + 0.6).abs() < 1e-12);
    }
}
