use crate::math::Tensor;

/// A trainable tensor together with its accumulated gradient.
#[derive(Debug, Clone)]
pub struct Param {
    pub value: Tensor,
    pub grad: Tensor,
}

impl Param {
    pub fn new(value: Tensor) -> Param {
        let grad = Tensor::zeros(&value.shape);
        Param { value, grad }
    }

    pub fn zero_grad(&mut self) {
        self.grad.data.iter_mut().for_each(|g| *g = 0.0);
    }
}
