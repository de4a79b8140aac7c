use crate::layers::{Mode, Param};
use crate::math::Tensor;
use crate::network::NetworkError;

/// Batch normalisation over the last (channel) axis.
///
/// Training uses the statistics of the current batch and folds them into the
/// moving averages; evaluation uses the moving averages only.
#[derive(Debug, Clone)]
pub struct BatchNorm {
    pub gamma: Param,
    pub beta: Param,
    pub moving_mean: Tensor,
    pub moving_variance: Tensor,
    pub momentum: f32,
    pub epsilon: f32,
    normalized: Option<Tensor>,
    inv_std: Vec<f32>,
}

impl BatchNorm {
    pub fn new(channels: usize, momentum: f32, epsilon: f32) -> BatchNorm {
        BatchNorm {
            gamma: Param::new(Tensor::filled(&[channels], 1.0)),
            beta: Param::new(Tensor::zeros(&[channels])),
            moving_mean: Tensor::zeros(&[channels]),
            moving_variance: Tensor::filled(&[channels], 1.0),
            momentum,
            epsilon,
            normalized: None,
            inv_std: Vec::new(),
        }
    }

    fn channels(&self) -> usize {
        self.gamma.value.len()
    }

    pub fn forward(&mut self, input: &Tensor, mode: Mode) -> Result<Tensor, NetworkError> {
        let c = self.channels();
        if input.shape.last() != Some(&c) {
            return Err(NetworkError::InputShape { layer: "batch_norm", expected: vec![c], got: input.shape.clone() });
        }
        let rows = input.len() / c;

        let (mean, var) = match mode {
            Mode::Eval => (self.moving_mean.data.clone(), self.moving_variance.data.clone()),
            Mode::Train => {
                let mut mean = vec![0.0f32; c];
                let mut var = vec![0.0f32; c];
                for row in input.data.chunks(c) {
                    for (m, x) in mean.iter_mut().zip(row) {
                        *m += x;
                    }
                }
                mean.iter_mut().for_each(|m| *m /= rows as f32);
                for row in input.data.chunks(c) {
                    for ((v, x), m) in var.iter_mut().zip(row).zip(&mean) {
                        *v += (x - m) * (x - m);
                    }
                }
                var.iter_mut().for_each(|v| *v /= rows as f32);
                for ci in 0..c {
                    self.moving_mean.data[ci] = self.momentum * self.moving_mean.data[ci] + (1.0 - self.momentum) * mean[ci];
                    self.moving_variance.data[ci] =
                        self.momentum * self.moving_variance.data[ci] + (1.0 - self.momentum) * var[ci];
                }
                (mean, var)
            }
        };

        let inv_std: Vec<f32> = var.iter().map(|v| 1.0 / (v + self.epsilon).sqrt()).collect();
        let mut normalized = Tensor::zeros(&input.shape);
        let mut out = Tensor::zeros(&input.shape);
        for (r, row) in input.data.chunks(c).enumerate() {
            for ci in 0..c {
                let x_hat = (row[ci] - mean[ci]) * inv_std[ci];
                normalized.data[r * c + ci] = x_hat;
                out.data[r * c + ci] = self.gamma.value.data[ci] * x_hat + self.beta.value.data[ci];
            }
        }
        if mode == Mode::Train {
            self.normalized = Some(normalized);
            self.inv_std = inv_std;
        }
        Ok(out)
    }

    pub fn backward(&mut self, grad: &Tensor) -> Result<Tensor, NetworkError> {
        let x_hat = self.normalized.take().ok_or(NetworkError::MissingForward("batch_norm"))?;
        let c = self.channels();
        let m = (x_hat.len() / c) as f32;

        let mut sum_g = vec![0.0f32; c];
        let mut sum_gx = vec![0.0f32; c];
        for (g_row, x_row) in grad.data.chunks(c).zip(x_hat.data.chunks(c)) {
            for ci in 0..c {
                sum_g[ci] += g_row[ci];
                sum_gx[ci] += g_row[ci] * x_row[ci];
            }
        }
        for ci in 0..c {
            self.gamma.grad.data[ci] += sum_gx[ci];
            self.beta.grad.data[ci] += sum_g[ci];
        }

        let mut dx = Tensor::zeros(&x_hat.shape);
        for (r, (g_row, x_row)) in grad.data.chunks(c).zip(x_hat.data.chunks(c)).enumerate() {
            for ci in 0..c {
                let scale = self.gamma.value.data[ci] * self.inv_std[ci] / m;
                dx.data[r * c + ci] = scale * (m * g_row[ci] - sum_g[ci] - x_row[ci] * sum_gx[ci]);
            }
        }
        self.inv_std = Vec::new();
        Ok(dx)
    }

    pub fn clear_cache(&mut self) {
        self.normalized = None;
        self.inv_std = Vec::new();
    }
}
