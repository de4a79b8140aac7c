use crate::layers::Param;

/// Adam with bias correction. Moment buffers are keyed by the position of
/// each parameter in the list passed to `step`, so the caller must always
/// pass parameters in the same order.
#[derive(Debug, Clone)]
pub struct Adam {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    steps: i32,
    m: Vec<Vec<f32>>,
    v: Vec<Vec<f32>>,
}

impl Adam {
    pub fn new(learning_rate: f32) -> Adam {
        Adam { learning_rate, beta1: 0.9, beta2: 0.999, epsilon: 1e-7, steps: 0, m: Vec::new(), v: Vec::new() }
    }

    /// Number of updates applied so far.
    pub fn steps(&self) -> i32 {
        self.steps
    }

    /// Applies one update to every parameter from its accumulated gradient.
    pub fn step(&mut self, params: Vec<&mut Param>) {
        if self.m.len() != params.len() {
            self.m = params.iter().map(|p| vec![0.0; p.value.len()]).collect();
            self.v = self.m.clone();
            self.steps = 0;
        }
        self.steps = self.steps.saturating_add(1);
        let bias1 = 1.0 - self.beta1.powi(self.steps);
        let bias2 = 1.0 - self.beta2.powi(self.steps);

        for ((param, m), v) in params.into_iter().zip(&mut self.m).zip(&mut self.v) {
            for (((w, g), m), v) in param.value.data.iter_mut().zip(&param.grad.data).zip(m.iter_mut()).zip(v.iter_mut()) {
                *m = self.beta1 * *m + (1.0 - self.beta1) * g;
                *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
                let m_hat = *m / bias1;
                let v_hat = *v / bias2;
                *w -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Tensor;

    #[test]
    fn first_step_moves_by_learning_rate() {
        let mut p = Param::new(Tensor::new(vec![2], vec![1.0, -1.0]).unwrap());
        p.grad.data = vec![0.5, -2.0];
        let mut adam = Adam::new(0.1);
        adam.step(vec![&mut p]);
        // bias-corrected first step is lr · sign(g)
        assert!((p.value.data[0] - 0.9).abs() < 1e-4);
        assert!((p.value.data[1] + 0.9).abs() < 1e-4);
        assert_eq!(adam.steps(), 1);
    }

    #[test]
    fn minimises_a_quadratic() {
        let mut p = Param::new(Tensor::new(vec![1], vec![3.0]).unwrap());
        let mut adam = Adam::new(0.1);
        for _ in 0..500 {
            p.grad.data[0] = 2.0 * p.value.data[0];
            adam.step(vec![&mut p]);
        }
        assert!(p.value.data[0].abs() < 0.25);
    }
}
