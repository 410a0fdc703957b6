use serde::{Serialize, Deserialize};

/// A trainable buffer and the gradient accumulated for it since the last
/// optimiser step. Only `value` is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub value: Vec<f64>,
    #[serde(skip)]
    grad: Vec<f64>,
}

impl Param {
    pub fn new(value: Vec<f64>) -> Param {
        let grad = vec![0.0; value.len()];
        Param { value, grad }
    }

    pub fn zeros(len: usize) -> Param {
        Param::new(vec![0.0; len])
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn grad(&self) -> &[f64] {
        &self.grad
    }

    /// Gradient buffer, (re)sized on demand so deserialised params work too.
    pub fn grad_mut(&mut self) -> &mut [f64] {
        if self.grad.len() != self.value.len() {
            self.grad = vec![0.0; self.value.len()];
        }
        &mut self.grad
    }

    pub fn zero_grad(&mut self) {
        self.grad.clear();
        self.grad.resize(self.value.len(), 0.0);
    }

    /// Splits the borrow so an optimiser can read the gradient while
    /// writing the value.
    pub fn value_and_grad_mut(&mut self) -> (&mut [f64], &[f64]) {
        if self.grad.len() != self.value.len() {
            self.grad = vec![0.0; self.value.len()];
        }
        (&mut self.value, &self.grad)
    }
}
