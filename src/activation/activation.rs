use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationFunction {
    Identity,
    #[serde(rename = "relu")]
    ReLU,
    /// Softmax is a vector-valued activation; it is applied per row by the
    /// `Activation` layer (not element-wise). The element-wise `function()`
    /// and `derivative()` methods are therefore not used for this variant.
    Softmax,
}

impl ActivationFunction {
    /// Element-wise activation. `Softmax` returns its input unchanged here;
    /// the layer normalises whole rows.
    pub fn function(&self, x: f32) -> f32 {
        match self {
            ActivationFunction::Identity | ActivationFunction::Softmax => x,
            ActivationFunction::ReLU => {
                if x > 0.0 {
                    x
                } else {
                    0.0
                }
            }
        }
    }

    /// Element-wise derivative of the activation at pre-activation `x`.
    ///
    /// For `Softmax`, the layer pairs it with cross-entropy and the combined
    /// gradient is `predicted - expected` (already computed by
    /// `CrossEntropyLoss::derivative()`). Returning `1.0` here passes that
    /// delta through unchanged without double-applying the Jacobian.
    pub fn derivative(&self, x: f32) -> f32 {
        match self {
            ActivationFunction::Identity | ActivationFunction::Softmax => 1.0,
            ActivationFunction::ReLU => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}
