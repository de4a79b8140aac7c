use serde::{Deserialize, Serialize};

use crate::activation::ActivationFunction::{ReLU, Softmax};
use crate::image::InputShape;
use crate::network::{LayerSpec, Network, NetworkError};
use crate::optim::Adam;

/// Learning rate used when a model is built for training.
pub const TRAINING_LEARNING_RATE: f32 = 1e-4;

/// Largest model `build_model` will allocate, counted in stored `f32` values.
/// Training keeps four copies of every weight (value, gradient and the two
/// Adam moments), so this caps a job at about 1 GiB of parameter memory.
pub const MAX_PARAMETERS: usize = 64_000_000;

const BN_MOMENTUM: f32 = 0.99;
const BN_EPSILON: f32 = 1e-3;

/// Named classifier topologies a job can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Default,
    Mobilenet,
    Simple,
}

impl Architecture {
    pub fn as_str(self) -> &'static str {
        match self {
            Architecture::Default => "default",
            Architecture::Mobilenet => "mobilenet",
            Architecture::Simple => "simple",
        }
    }
}

/// A freshly initialised network paired with its optimizer. The loss is always
/// categorical cross-entropy over the softmax output and the reported metric
/// is accuracy.
#[derive(Debug)]
pub struct CompiledModel {
    pub network: Network,
    pub optimizer: Adam,
}

/// Layer list for `architecture` ending in a `classes`-way softmax.
pub fn topology_for(architecture: Architecture, classes: usize) -> Vec<LayerSpec> {
    match architecture {
        Architecture::Simple => vec![
            LayerSpec::Flatten,
            LayerSpec::Dense { units: 128, activation: ReLU },
            LayerSpec::Dropout { rate: 0.5 },
            LayerSpec::Dense { units: classes, activation: Softmax },
        ],
        Architecture::Default => {
            let mut layers = Vec::new();
            for filters in [32, 64, 128, 256] {
                for _ in 0..2 {
                    layers.push(LayerSpec::Conv2d { filters, kernel_size: 3, strides: 1, activation: ReLU });
                }
                layers.push(LayerSpec::MaxPool2d { pool_size: 2 });
            }
            layers.extend([
                LayerSpec::Flatten,
                LayerSpec::Dense { units: 512, activation: ReLU },
                LayerSpec::Dropout { rate: 0.5 },
                LayerSpec::Dense { units: classes, activation: Softmax },
            ]);
            layers
        }
        Architecture::Mobilenet => {
            let mut layers = vec![LayerSpec::Conv2d { filters: 32, kernel_size: 3, strides: 2, activation: ReLU }];
            for (filters, strides) in [(64, 1), (128, 2), (128, 1), (256, 2), (256, 1), (512, 2)] {
                layers.extend([
                    LayerSpec::DepthwiseConv2d { kernel_size: 3, strides, activation: ReLU },
                    LayerSpec::Conv2d { filters, kernel_size: 1, strides: 1, activation: ReLU },
                    LayerSpec::BatchNorm { momentum: BN_MOMENTUM, epsilon: BN_EPSILON },
                ]);
            }
            layers.extend([
                LayerSpec::GlobalAvgPool,
                LayerSpec::Dropout { rate: 0.2 },
                LayerSpec::Dense { units: classes, activation: Softmax },
            ]);
            layers
        }
    }
}

/// Walks the topology for `input_shape` without allocating and returns the
/// parameter count, or `InvalidArchitecture` when it exceeds `MAX_PARAMETERS`.
pub fn check_model_size(architecture: Architecture, input_shape: InputShape, classes: usize) -> Result<usize, NetworkError> {
    let mut shape = input_shape.dims().to_vec();
    let mut total = 0usize;
    for spec in topology_for(architecture, classes) {
        total = total.saturating_add(spec.parameter_count(&shape));
        shape = spec.output_shape(&shape)?;
    }
    if total > MAX_PARAMETERS {
        return Err(NetworkError::InvalidArchitecture(format!(
            "{} at {}x{}x{} needs {total} parameters, limit is {MAX_PARAMETERS}",
            architecture.as_str(),
            input_shape.width,
            input_shape.height,
            input_shape.channels
        )));
    }
    Ok(total)
}

/// Builds `architecture` for `input_shape` and `classes` outputs, ready to train.
pub fn build_model(
    architecture: Architecture,
    input_shape: InputShape,
    classes: usize,
    seed: u64,
) -> Result<CompiledModel, NetworkError> {
    if classes == 0 {
        return Err(NetworkError::InvalidArchitecture("a classifier needs at least one class".into()));
    }
    check_model_size(architecture, input_shape, classes)?;
    let network = Network::from_topology(input_shape, topology_for(architecture, classes), seed)?;
    Ok(CompiledModel { network, optimizer: Adam::new(TRAINING_LEARNING_RATE) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_has_one_output_per_class() {
        let shape = InputShape { width: 8, height: 8, channels: 3 };
        let model = build_model(Architecture::Simple, shape, 2, 1).unwrap();
        assert_eq!(model.network.output_dim(), 2);
        assert_eq!(model.optimizer.learning_rate, TRAINING_LEARNING_RATE);
    }

    #[test]
    fn mobilenet_builds_for_small_inputs() {
        let shape = InputShape { width: 16, height: 16, channels: 1 };
        let model = build_model(Architecture::Mobilenet, shape, 3, 1).unwrap();
        assert_eq!(model.network.output_dim(), 3);
    }

    #[test]
    fn default_rejects_inputs_too_small_for_four_pools() {
        let shape = InputShape { width: 8, height: 8, channels: 3 };
        assert!(matches!(
            build_model(Architecture::Default, shape, 2, 1),
            Err(NetworkError::InvalidArchitecture(_))
        ));
    }

    #[test]
    fn size_check_agrees_with_the_built_network() {
        let shape = InputShape { width: 32, height: 32, channels: 3 };
        for architecture in [Architecture::Simple, Architecture::Default, Architecture::Mobilenet] {
            let counted = check_model_size(architecture, shape, 3).unwrap();
            let model = build_model(architecture, shape, 3, 1).unwrap();
            assert_eq!(counted, model.network.parameter_count(), "{}", architecture.as_str());
        }
    }

    #[test]
    fn oversized_models_are_rejected_before_allocation() {
        let huge = InputShape { width: 1024, height: 1024, channels: 3 };
        for architecture in [Architecture::Simple, Architecture::Default] {
            assert!(matches!(
                build_model(architecture, huge, 2, 1),
                Err(NetworkError::InvalidArchitecture(_))
            ));
        }
        // the default topology at its usual resolution stays within budget
        let usual = InputShape { width: 224, height: 224, channels: 3 };
        assert!(check_model_size(Architecture::Default, usual, 2).unwrap() <= MAX_PARAMETERS);
    }

    #[test]
    fn architecture_parses_lowercase() {
        let a: Architecture = serde_json::from_str("\"mobilenet\"").unwrap();
        assert_eq!(a, Architecture::Mobilenet);
    }
}
