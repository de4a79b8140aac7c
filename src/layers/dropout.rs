use rand::rngs::StdRng;
use rand::Rng;

use crate::layers::Mode;
use crate::math::Tensor;
use crate::network::NetworkError;

/// Inverted dropout: surviving activations are scaled by `1 / (1 - rate)` during
/// training so evaluation is the identity.
#[derive(Debug, Clone)]
pub struct Dropout {
    pub rate: f32,
    rng: StdRng,
    mask: Option<Vec<f32>>,
}

impl Dropout {
    pub fn new(rate: f32, rng: StdRng) -> Dropout {
        Dropout { rate, rng, mask: None }
    }

    pub fn forward(&mut self, input: &Tensor, mode: Mode) -> Result<Tensor, NetworkError> {
        if mode == Mode::Eval || self.rate <= 0.0 {
            if mode == Mode::Train {
                self.mask = Some(vec![1.0; input.len()]);
            }
            return Ok(input.clone());
        }
        let keep = 1.0 - self.rate;
        let mask: Vec<f32> = (0..input.len())
            .map(|_| if self.rng.gen::<f32>() < self.rate { 0.0 } else { 1.0 / keep })
            .collect();
        let data = input.data.iter().zip(&mask).map(|(x, m)| x * m).collect();
        self.mask = Some(mask);
        Ok(Tensor::new(input.shape.clone(), data)?)
    }

    pub fn backward(&mut self, grad: &Tensor) -> Result<Tensor, NetworkError> {
        let mask = self.mask.take().ok_or(NetworkError::MissingForward("dropout"))?;
        let data = grad.data.iter().zip(&mask).map(|(g, m)| g * m).collect();
        Ok(Tensor::new(grad.shape.clone(), data)?)
    }

    pub fn clear_cache(&mut self) {
        self.mask = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn eval_is_identity() {
        let mut d = Dropout::new(0.5, StdRng::seed_from_u64(0));
        let x = Tensor::filled(&[2, 8], 1.0);
        assert_eq!(d.forward(&x, Mode::Eval).unwrap(), x);
    }

    #[test]
    fn training_zeroes_or_scales() {
        let mut d = Dropout::new(0.5, StdRng::seed_from_u64(0));
        let x = Tensor::filled(&[1, 64], 1.0);
        let out = d.forward(&x, Mode::Train).unwrap();
        assert!(out.data.iter().all(|v| *v == 0.0 || (*v - 2.0).abs() < 1e-6));
        assert!(out.data.iter().any(|v| *v == 0.0));
        let dx = d.backward(&Tensor::filled(&[1, 64], 1.0)).unwrap();
        assert_eq!(dx.data, out.data);
    }
}
