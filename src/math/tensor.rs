use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TensorError {
    #[error("shape {shape:?} implies {expected} elements, got {got}")]
    ShapeMismatch { shape: Vec<usize>, expected: usize, got: usize },

    #[error("cannot stack an empty list of tensors")]
    EmptyStack,

    #[error("cannot stack tensors of shape {first:?} and {other:?}")]
    InconsistentStack { first: Vec<usize>, other: Vec<usize> },
}

/// Dense row-major `f32` tensor.
///
/// Image batches use NHWC layout: `[batch, height, width, channels]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Tensor, TensorError> {
        let expected = element_count(&shape);
        if expected != data.len() {
            return Err(TensorError::ShapeMismatch { shape, expected, got: data.len() });
        }
        Ok(Tensor { shape, data })
    }

    pub fn zeros(shape: &[usize]) -> Tensor {
        Tensor { shape: shape.to_vec(), data: vec![0.0; element_count(shape)] }
    }

    pub fn filled(shape: &[usize], value: f32) -> Tensor {
        Tensor { shape: shape.to_vec(), data: vec![value; element_count(shape)] }
    }

    /// Samples a single value from N(0, 1) using the Box-Muller transform.
    fn sample_standard_normal(rng: &mut StdRng) -> f32 {
        // (0, 1] avoids log(0).
        let u1: f32 = 1.0 - rng.gen::<f32>();
        let u2: f32 = 1.0 - rng.gen::<f32>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }

    /// He initialization: samples from N(0, sqrt(2 / fan_in)).
    ///
    /// Used for weights feeding a ReLU. The variance 2/fan_in accounts for
    /// ReLU zeroing half of its inputs on average.
    pub fn he(shape: &[usize], fan_in: usize, rng: &mut StdRng) -> Tensor {
        let std_dev = (2.0 / fan_in.max(1) as f32).sqrt();
        Tensor::normal(shape, std_dev, rng)
    }

    /// Xavier (Glorot) initialization: samples from N(0, sqrt(1 / fan_in)).
    pub fn xavier(shape: &[usize], fan_in: usize, rng: &mut StdRng) -> Tensor {
        let std_dev = (1.0 / fan_in.max(1) as f32).sqrt();
        Tensor::normal(shape, std_dev, rng)
    }

    fn normal(shape: &[usize], std_dev: f32, rng: &mut StdRng) -> Tensor {
        let data = (0..element_count(shape))
            .map(|_| Tensor::sample_standard_normal(rng) * std_dev)
            .collect();
        Tensor { shape: shape.to_vec(), data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Leading dimension (batch size for activations).
    pub fn batch(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Number of elements per batch item.
    pub fn item_len(&self) -> usize {
        element_count(&self.shape[1.min(self.shape.len())..])
    }

    /// The `i`-th batch item as a flat slice.
    pub fn item(&self, i: usize) -> &[f32] {
        let n = self.item_len();
        &self.data[i * n..(i + 1) * n]
    }

    pub fn reshape(self, shape: Vec<usize>) -> Result<Tensor, TensorError> {
        Tensor::new(shape, self.data)
    }

    pub fn map<F>(&self, functor: F) -> Tensor
    where
        F: Fn(f32) -> f32,
    {
        Tensor { shape: self.shape.clone(), data: self.data.iter().map(|&x| functor(x)).collect() }
    }

    /// Stacks `[1, ...]` (or unbatched) tensors of identical shape into
    /// `[N, ...]`.
    pub fn stack(items: &[Tensor]) -> Result<Tensor, TensorError> {
        let first = items.first().ok_or(TensorError::EmptyStack)?;
        let inner: Vec<usize> = match first.shape.split_first() {
            Some((1, rest)) => rest.to_vec(),
            _ => first.shape.clone(),
        };
        let mut data = Vec::with_capacity(items.len() * element_count(&inner));
        for t in items {
            if t.len() != first.len() || (t.shape != first.shape) {
                return Err(TensorError::InconsistentStack {
                    first: first.shape.clone(),
                    other: t.shape.clone(),
                });
            }
            data.extend_from_slice(&t.data);
        }
        let mut shape = vec![items.len()];
        shape.extend(inner);
        Tensor::new(shape, data)
    }

    /// Bytes held by the element buffer.
    pub fn size_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

impl Default for Tensor {
    fn default() -> Self {
        Tensor { shape: vec![0], data: vec![] }
    }
}

pub fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Index of the maximum element in a slice (first wins on ties).
pub fn argmax(v: &[f32]) -> usize {
    let mut best = 0;
    for (i, x) in v.iter().enumerate() {
        if *x > v[best] {
            best = i;
        }
    }
    best
}

/// Numerically stable softmax over a single row.
pub fn softmax_in_place(row: &mut [f32]) {
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for x in row.iter_mut() {
        *x = (*x - max).exp();
        sum += *x;
    }
    if sum > 0.0 {
        for x in row.iter_mut() {
            *x /= sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn new_rejects_wrong_element_count() {
        let err = Tensor::new(vec![2, 3], vec![0.0; 5]).unwrap_err();
        assert_eq!(err, TensorError::ShapeMismatch { shape: vec![2, 3], expected: 6, got: 5 });
    }

    #[test]
    fn stack_builds_batch_dimension() {
        let a = Tensor::new(vec![1, 2, 2, 1], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Tensor::new(vec![1, 2, 2, 1], vec![5.0, 6.0, 7.0, 8.0]).unwrap();
        let s = Tensor::stack(&[a, b]).unwrap();
        assert_eq!(s.shape, vec![2, 2, 2, 1]);
        assert_eq!(s.item(1), &[5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn stack_rejects_mixed_shapes() {
        let a = Tensor::zeros(&[1, 2]);
        let b = Tensor::zeros(&[1, 3]);
        assert!(matches!(Tensor::stack(&[a, b]), Err(TensorError::InconsistentStack { .. })));
        assert_eq!(Tensor::stack(&[]), Err(TensorError::EmptyStack));
    }

    #[test]
    fn seeded_init_is_reproducible() {
        let a = Tensor::he(&[4, 4], 4, &mut StdRng::seed_from_u64(7));
        let b = Tensor::he(&[4, 4], 4, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn softmax_sums_to_one() {
        let mut row = vec![1.0, 2.0, 3.0];
        softmax_in_place(&mut row);
        let sum: f32 = row.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert_eq!(argmax(&row), 2);
    }

    #[test]
    fn softmax_single_class_is_one() {
        let mut row = vec![-42.0];
        softmax_in_place(&mut row);
        assert_eq!(row, vec![1.0]);
    }
}
