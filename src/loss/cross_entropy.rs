use crate::math::Tensor;

/// Categorical cross-entropy loss for use with a Softmax output layer.
pub struct CrossEntropyLoss;

/// Small epsilon added inside log() to prevent log(0) = -inf.
const EPS: f32 = 1e-7;

impl CrossEntropyLoss {
    /// Mean cross-entropy over the batch:
    ///   L = -(1/N) · Σ_n Σ_i expected[n,i] · log(predicted[n,i] + eps)
    ///
    /// `predicted` : softmax probabilities, shape [N, classes]
    /// `expected`  : one-hot targets, same shape
    pub fn loss(predicted: &Tensor, expected: &Tensor) -> f32 {
        let n = predicted.batch().max(1) as f32;
        let total: f32 = predicted
            .data
            .iter()
            .zip(&expected.data)
            .map(|(p, e)| -e * (p + EPS).ln())
            .sum();
        total / n
    }

    /// Gradient of the combined Softmax + mean cross-entropy w.r.t. the
    /// pre-softmax logits:
    ///   ∂L/∂z[n,i] = (predicted[n,i] - expected[n,i]) / N
    ///
    /// This is the initial delta passed into the backward pass; the Softmax
    /// activation's own derivative is identity so it is not applied twice.
    pub fn derivative(predicted: &Tensor, expected: &Tensor) -> Tensor {
        let inv_n = 1.0 / predicted.batch().max(1) as f32;
        Tensor {
            shape: predicted.shape.clone(),
            data: predicted.data.iter().zip(&expected.data).map(|(p, e)| (p - e) * inv_n).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confident_correct_prediction_has_low_loss() {
        let p = Tensor::new(vec![1, 2], vec![0.99, 0.01]).unwrap();
        let y = Tensor::new(vec![1, 2], vec![1.0, 0.0]).unwrap();
        assert!(CrossEntropyLoss::loss(&p, &y) < 0.02);
    }

    #[test]
    fn loss_is_averaged_over_batch() {
        let p = Tensor::new(vec![2, 2], vec![0.5, 0.5, 0.5, 0.5]).unwrap();
        let y = Tensor::new(vec![2, 2], vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        assert!((CrossEntropyLoss::loss(&p, &y) - 0.5f32.ln().abs()).abs() < 1e-5);
    }

    #[test]
    fn derivative_is_scaled_difference() {
        let p = Tensor::new(vec![2, 2], vec![0.7, 0.3, 0.2, 0.8]).unwrap();
        let y = Tensor::new(vec![2, 2], vec![1.0, 0.0, 1.0, 0.0]).unwrap();
        let d = CrossEntropyLoss::derivative(&p, &y);
        let expected = [-0.15, 0.15, -0.4, 0.4];
        for (a, b) in d.data.iter().zip(expected) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
