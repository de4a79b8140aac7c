use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::image::InputShape;
use crate::layers::{Layer, Mode, Param};
use crate::math::Tensor;
use crate::network::{LayerSpec, NetworkError};

/// A sequential stack of layers built from a serializable topology.
///
/// The topology is kept next to the built layers so the network can be
/// written back out as an artifact without any extra bookkeeping.
#[derive(Debug, Clone)]
pub struct Network {
    pub input_shape: InputShape,
    pub topology: Vec<LayerSpec>,
    pub layers: Vec<Layer>,
    output_shape: Vec<usize>,
}

impl Network {
    /// Builds every layer of `topology`, inferring each layer's input shape
    /// from the one before it. All random initialisation is drawn from a
    /// single generator seeded with `seed`.
    pub fn from_topology(
        input_shape: InputShape,
        topology: Vec<LayerSpec>,
        seed: u64,
    ) -> Result<Network, NetworkError> {
        if topology.is_empty() {
            return Err(NetworkError::InvalidArchitecture("topology has no layers".into()));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut shape = input_shape.dims().to_vec();
        let mut layers = Vec::with_capacity(topology.len());
        for spec in &topology {
            let next = spec.output_shape(&shape)?;
            layers.push(Layer::build(spec, &shape, &mut rng)?);
            shape = next;
        }
        Ok(Network { input_shape, topology, layers, output_shape: shape })
    }

    /// Number of values produced per sample (the class count for classifiers).
    pub fn output_dim(&self) -> usize {
        self.output_shape.iter().product()
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().flat_map(|l| l.weights()).map(|(_, t)| t.len()).sum()
    }

    /// Runs `input` (`[N, h, w, c]`) through every layer. In `Mode::Train`
    /// each layer keeps what its backward pass needs until `backward` or
    /// `release` is called.
    pub fn forward(&mut self, input: &Tensor, mode: Mode) -> Result<Tensor, NetworkError> {
        let expected = self.input_shape.dims();
        if input.shape.len() != 4 || input.shape[1..] != expected[..] {
            return Err(NetworkError::InputShape {
                layer: "network",
                expected: expected.to_vec(),
                got: input.shape.clone(),
            });
        }
        let mut current: Option<Tensor> = None;
        for layer in &mut self.layers {
            let next = layer.forward(current.as_ref().unwrap_or(input), mode)?;
            current = Some(next);
        }
        current.ok_or_else(|| NetworkError::InvalidArchitecture("topology has no layers".into()))
    }

    /// Back-propagates the loss gradient w.r.t. the network output, accumulating
    /// parameter gradients in every layer.
    pub fn backward(&mut self, grad: Tensor) -> Result<(), NetworkError> {
        let mut delta = grad;
        for layer in self.layers.iter_mut().rev() {
            delta = layer.backward(&delta)?;
        }
        Ok(())
    }

    /// Evaluation-mode forward pass. Nothing is cached.
    pub fn predict(&mut self, input: &Tensor) -> Result<Tensor, NetworkError> {
        self.forward(input, Mode::Eval)
    }

    pub fn params_mut(&mut self) -> Vec<&mut Param> {
        self.layers.iter_mut().flat_map(|l| l.params_mut()).collect()
    }

    pub fn zero_grad(&mut self) {
        for p in self.params_mut() {
            p.zero_grad();
        }
    }

    /// Drops every activation cached by a training-mode forward pass.
    pub fn release(&mut self) {
        for layer in &mut self.layers {
            layer.clear_cache();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationFunction;

    fn tiny() -> Network {
        let shape = InputShape { width: 4, height: 4, channels: 1 };
        let topology = vec![
            LayerSpec::Conv2d { filters: 2, kernel_size: 3, strides: 1, activation: ActivationFunction::ReLU },
            LayerSpec::MaxPool2d { pool_size: 2 },
            LayerSpec::Flatten,
            LayerSpec::Dense { units: 3, activation: ActivationFunction::Softmax },
        ];
        Network::from_topology(shape, topology, 7).unwrap()
    }

    #[test]
    fn same_seed_builds_identical_weights() {
        let a = tiny();
        let b = tiny();
        for (la, lb) in a.layers.iter().zip(&b.layers) {
            for ((_, ta), (_, tb)) in la.weights().iter().zip(lb.weights()) {
                assert_eq!(ta.data, tb.data);
            }
        }
        assert_eq!(a.output_dim(), 3);
    }

    #[test]
    fn forward_produces_probability_rows() {
        let mut net = tiny();
        let x = Tensor::filled(&[2, 4, 4, 1], 0.5);
        let out = net.predict(&x).unwrap();
        assert_eq!(out.shape, vec![2, 3]);
        for s in 0..2 {
            let sum: f32 = out.item(s).iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn rejects_wrong_input_shape() {
        let mut net = tiny();
        let x = Tensor::zeros(&[1, 5, 4, 1]);
        assert!(matches!(net.predict(&x), Err(NetworkError::InputShape { .. })));
    }

    #[test]
    fn backward_after_release_fails() {
        let mut net = tiny();
        let x = Tensor::filled(&[1, 4, 4, 1], 0.5);
        net.forward(&x, Mode::Train).unwrap();
        net.release();
        assert!(net.backward(Tensor::zeros(&[1, 3])).is_err());
    }

    #[test]
    fn collapsing_topology_is_rejected() {
        let shape = InputShape { width: 2, height: 2, channels: 1 };
        let topology = vec![
            LayerSpec::MaxPool2d { pool_size: 2 },
            LayerSpec::MaxPool2d { pool_size: 2 },
            LayerSpec::Flatten,
        ];
        assert!(matches!(
            Network::from_topology(shape, topology, 0),
            Err(NetworkError::InvalidArchitecture(_))
        ));
    }
}
