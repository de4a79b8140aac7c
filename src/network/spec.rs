use serde::{Deserialize, Serialize};

use crate::activation::ActivationFunction;
use crate::layers::conv::same_geometry;
use crate::network::NetworkError;

/// Serializable description of one layer in a network topology.
///
/// Shapes are never stored here: each layer's input shape is inferred from
/// the network input shape and the layers before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    Conv2d { filters: usize, kernel_size: usize, strides: usize, activation: ActivationFunction },
    DepthwiseConv2d { kernel_size: usize, strides: usize, activation: ActivationFunction },
    MaxPool2d { pool_size: usize },
    BatchNorm { momentum: f32, epsilon: f32 },
    Flatten,
    GlobalAvgPool,
    Dense { units: usize, activation: ActivationFunction },
    Dropout { rate: f32 },
}

impl LayerSpec {
    /// Per-item output shape for per-item input shape `input`.
    pub fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>, NetworkError> {
        let spatial = |name: &str| -> Result<(usize, usize, usize), NetworkError> {
            match input {
                [h, w, c] => Ok((*h, *w, *c)),
                _ => Err(NetworkError::InvalidArchitecture(format!("{name} needs an [h, w, c] input, got {input:?}"))),
            }
        };
        let out = match self {
            LayerSpec::Conv2d { filters, kernel_size, strides, .. } => {
                let (h, w, _) = spatial("conv2d")?;
                check_positive("conv2d", &[*filters, *kernel_size, *strides])?;
                vec![same_geometry(h, *kernel_size, *strides).0, same_geometry(w, *kernel_size, *strides).0, *filters]
            }
            LayerSpec::DepthwiseConv2d { kernel_size, strides, .. } => {
                let (h, w, c) = spatial("depthwise_conv2d")?;
                check_positive("depthwise_conv2d", &[*kernel_size, *strides])?;
                vec![same_geometry(h, *kernel_size, *strides).0, same_geometry(w, *kernel_size, *strides).0, c]
            }
            LayerSpec::MaxPool2d { pool_size } => {
                let (h, w, c) = spatial("max_pool2d")?;
                check_positive("max_pool2d", &[*pool_size])?;
                if h < *pool_size || w < *pool_size {
                    return Err(NetworkError::InvalidArchitecture(format!(
                        "max_pool2d({pool_size}) collapses a {h}x{w} feature map to zero"
                    )));
                }
                vec![h / pool_size, w / pool_size, c]
            }
            LayerSpec::BatchNorm { .. } | LayerSpec::Dropout { .. } => input.to_vec(),
            LayerSpec::Flatten => vec![input.iter().product()],
            LayerSpec::GlobalAvgPool => {
                let (_, _, c) = spatial("global_avg_pool")?;
                vec![c]
            }
            LayerSpec::Dense { units, .. } => {
                if input.len() != 1 {
                    return Err(NetworkError::InvalidArchitecture(format!("dense needs a flat input, got {input:?}")));
                }
                check_positive("dense", &[*units])?;
                vec![*units]
            }
        };
        Ok(out)
    }

    /// Number of stored values (trainable or not) this layer holds for
    /// per-item input shape `input`. Matches what `Layer::weights` exposes.
    pub fn parameter_count(&self, input: &[usize]) -> usize {
        let channels = input.last().copied().unwrap_or(0);
        match self {
            LayerSpec::Conv2d { filters, kernel_size, .. } => kernel_size * kernel_size * channels * filters + filters,
            LayerSpec::DepthwiseConv2d { kernel_size, .. } => kernel_size * kernel_size * channels + channels,
            LayerSpec::BatchNorm { .. } => 4 * channels,
            LayerSpec::Dense { units, .. } => input.iter().product::<usize>() * units + units,
            LayerSpec::MaxPool2d { .. }
            | LayerSpec::Flatten
            | LayerSpec::GlobalAvgPool
            | LayerSpec::Dropout { .. } => 0,
        }
    }
}

fn check_positive(layer: &str, values: &[usize]) -> Result<(), NetworkError> {
    if values.iter().any(|v| *v == 0) {
        return Err(NetworkError::InvalidArchitecture(format!("{layer} has a zero-sized parameter")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conv_shape_uses_same_padding() {
        let spec = LayerSpec::Conv2d { filters: 8, kernel_size: 3, strides: 2, activation: ActivationFunction::ReLU };
        assert_eq!(spec.output_shape(&[9, 9, 3]).unwrap(), vec![5, 5, 8]);
    }

    #[test]
    fn pool_rejects_collapse() {
        let spec = LayerSpec::MaxPool2d { pool_size: 2 };
        assert!(spec.output_shape(&[1, 4, 3]).is_err());
    }

    #[test]
    fn dense_requires_flat_input() {
        let spec = LayerSpec::Dense { units: 4, activation: ActivationFunction::ReLU };
        assert!(spec.output_shape(&[2, 2, 1]).is_err());
        assert_eq!(LayerSpec::Flatten.output_shape(&[2, 2, 1]).unwrap(), vec![4]);
    }

    #[test]
    fn parameter_count_includes_biases() {
        let conv = LayerSpec::Conv2d { filters: 4, kernel_size: 3, strides: 1, activation: ActivationFunction::ReLU };
        assert_eq!(conv.parameter_count(&[8, 8, 2]), 3 * 3 * 2 * 4 + 4);
        let dense = LayerSpec::Dense { units: 5, activation: ActivationFunction::ReLU };
        assert_eq!(dense.parameter_count(&[12]), 12 * 5 + 5);
        assert_eq!(LayerSpec::Flatten.parameter_count(&[2, 2, 3]), 0);
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(LayerSpec::Dropout { rate: 0.5 }).unwrap();
        assert_eq!(json["type"], "dropout");
    }
}
