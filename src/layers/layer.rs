use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::layers::conv::{Conv2d, DepthwiseConv2d};
use crate::layers::dense::Dense;
use crate::layers::dropout::Dropout;
use crate::layers::norm::BatchNorm;
use crate::layers::pool::{Flatten, GlobalAvgPool, MaxPool2d};
use crate::layers::{Mode, Param};
use crate::math::Tensor;
use crate::network::{LayerSpec, NetworkError};

/// A built layer holding its parameters and per-step caches.
#[derive(Debug, Clone)]
pub enum Layer {
    Conv2d(Conv2d),
    DepthwiseConv2d(DepthwiseConv2d),
    MaxPool2d(MaxPool2d),
    BatchNorm(BatchNorm),
    Flatten(Flatten),
    GlobalAvgPool(GlobalAvgPool),
    Dense(Dense),
    Dropout(Dropout),
}

impl Layer {
    /// Instantiates `spec` for per-item input shape `input` (`[h, w, c]` or `[d]`).
    pub fn build(spec: &LayerSpec, input: &[usize], rng: &mut StdRng) -> Result<Layer, NetworkError> {
        let channels = *input.last().ok_or(NetworkError::InvalidArchitecture("empty input shape".into()))?;
        let layer = match spec {
            LayerSpec::Conv2d { filters, kernel_size, strides, activation } => {
                Layer::Conv2d(Conv2d::new(*filters, *kernel_size, *strides, channels, *activation, rng))
            }
            LayerSpec::DepthwiseConv2d { kernel_size, strides, activation } => {
                Layer::DepthwiseConv2d(DepthwiseConv2d::new(*kernel_size, *strides, channels, *activation, rng))
            }
            LayerSpec::MaxPool2d { pool_size } => Layer::MaxPool2d(MaxPool2d::new(*pool_size)),
            LayerSpec::BatchNorm { momentum, epsilon } => Layer::BatchNorm(BatchNorm::new(channels, *momentum, *epsilon)),
            LayerSpec::Flatten => Layer::Flatten(Flatten::default()),
            LayerSpec::GlobalAvgPool => Layer::GlobalAvgPool(GlobalAvgPool::default()),
            LayerSpec::Dense { units, activation } => {
                if input.len() != 1 {
                    return Err(NetworkError::InvalidArchitecture(format!(
                        "dense layer needs a flat input, got {:?}",
                        input
                    )));
                }
                Layer::Dense(Dense::new(*units, channels, *activation, rng))
            }
            LayerSpec::Dropout { rate } => Layer::Dropout(Dropout::new(*rate, StdRng::seed_from_u64(rng_seed(rng)))),
        };
        Ok(layer)
    }

    pub fn forward(&mut self, input: &Tensor, mode: Mode) -> Result<Tensor, NetworkError> {
        match self {
            Layer::Conv2d(l) => l.forward(input, mode),
            Layer::DepthwiseConv2d(l) => l.forward(input, mode),
            Layer::MaxPool2d(l) => l.forward(input, mode),
            Layer::BatchNorm(l) => l.forward(input, mode),
            Layer::Flatten(l) => l.forward(input, mode),
            Layer::GlobalAvgPool(l) => l.forward(input, mode),
            Layer::Dense(l) => l.forward(input, mode),
            Layer::Dropout(l) => l.forward(input, mode),
        }
    }

    pub fn backward(&mut self, grad: &Tensor) -> Result<Tensor, NetworkError> {
        match self {
            Layer::Conv2d(l) => l.backward(grad),
            Layer::DepthwiseConv2d(l) => l.backward(grad),
            Layer::MaxPool2d(l) => l.backward(grad),
            Layer::BatchNorm(l) => l.backward(grad),
            Layer::Flatten(l) => l.backward(grad),
            Layer::GlobalAvgPool(l) => l.backward(grad),
            Layer::Dense(l) => l.backward(grad),
            Layer::Dropout(l) => l.backward(grad),
        }
    }

    /// Drops every tensor cached by the last forward pass.
    pub fn clear_cache(&mut self) {
        match self {
            Layer::Conv2d(l) => l.clear_cache(),
            Layer::DepthwiseConv2d(l) => l.clear_cache(),
            Layer::MaxPool2d(l) => l.clear_cache(),
            Layer::BatchNorm(l) => l.clear_cache(),
            Layer::Flatten(l) => l.clear_cache(),
            Layer::GlobalAvgPool(l) => l.clear_cache(),
            Layer::Dense(l) => l.clear_cache(),
            Layer::Dropout(l) => l.clear_cache(),
        }
    }

    /// Trainable parameters in a stable order.
    pub fn params_mut(&mut self) -> Vec<&mut Param> {
        match self {
            Layer::Conv2d(l) => vec![&mut l.kernel, &mut l.biases],
            Layer::DepthwiseConv2d(l) => vec![&mut l.kernel, &mut l.biases],
            Layer::BatchNorm(l) => vec![&mut l.gamma, &mut l.beta],
            Layer::Dense(l) => vec![&mut l.weights, &mut l.biases],
            Layer::MaxPool2d(_) | Layer::Flatten(_) | Layer::GlobalAvgPool(_) | Layer::Dropout(_) => Vec::new(),
        }
    }

    /// Every persisted tensor (trainable and moving statistics), named by role.
    pub fn weights(&self) -> Vec<(&'static str, &Tensor)> {
        match self {
            Layer::Conv2d(l) => vec![("kernel", &l.kernel.value), ("bias", &l.biases.value)],
            Layer::DepthwiseConv2d(l) => vec![("depthwise_kernel", &l.kernel.value), ("bias", &l.biases.value)],
            Layer::BatchNorm(l) => vec![
                ("gamma", &l.gamma.value),
                ("beta", &l.beta.value),
                ("moving_mean", &l.moving_mean),
                ("moving_variance", &l.moving_variance),
            ],
            Layer::Dense(l) => vec![("kernel", &l.weights.value), ("bias", &l.biases.value)],
            Layer::MaxPool2d(_) | Layer::Flatten(_) | Layer::GlobalAvgPool(_) | Layer::Dropout(_) => Vec::new(),
        }
    }

    /// Mutable view of the same tensors, in the same order as `weights()`.
    pub fn weights_mut(&mut self) -> Vec<&mut Tensor> {
        match self {
            Layer::Conv2d(l) => vec![&mut l.kernel.value, &mut l.biases.value],
            Layer::DepthwiseConv2d(l) => vec![&mut l.kernel.value, &mut l.biases.value],
            Layer::BatchNorm(l) => vec![&mut l.gamma.value, &mut l.beta.value, &mut l.moving_mean, &mut l.moving_variance],
            Layer::Dense(l) => vec![&mut l.weights.value, &mut l.biases.value],
            Layer::MaxPool2d(_) | Layer::Flatten(_) | Layer::GlobalAvgPool(_) | Layer::Dropout(_) => Vec::new(),
        }
    }
}

fn rng_seed(rng: &mut StdRng) -> u64 {
    use rand::Rng;
    rng.gen()
}
