use rand::rngs::StdRng;

use crate::activation::ActivationFunction;
use crate::layers::{Mode, Param};
use crate::math::{softmax_in_place, Tensor};
use crate::network::NetworkError;

/// Fully connected layer: `a = f(xW + b)` over `[N, in]` inputs.
#[derive(Debug, Clone)]
pub struct Dense {
    pub weights: Param, // [in, units]
    pub biases: Param,  // [units]
    pub activator: ActivationFunction,
    input: Option<Tensor>,
    pre_activation: Option<Tensor>, // z = xW + b, needed for the derivative
}

impl Dense {
    pub fn new(units: usize, input_size: usize, activator: ActivationFunction, rng: &mut StdRng) -> Dense {
        let weights = match activator {
            ActivationFunction::ReLU => Tensor::he(&[input_size, units], input_size, rng),
            _ => Tensor::xavier(&[input_size, units], input_size, rng),
        };
        Dense {
            weights: Param::new(weights),
            biases: Param::new(Tensor::zeros(&[units])),
            activator,
            input: None,
            pre_activation: None,
        }
    }

    pub fn units(&self) -> usize {
        self.weights.value.shape[1]
    }

    pub fn forward(&mut self, input: &Tensor, mode: Mode) -> Result<Tensor, NetworkError> {
        let in_size = self.weights.value.shape[0];
        let units = self.units();
        if input.shape.len() != 2 || input.shape[1] != in_size {
            return Err(NetworkError::InputShape {
                layer: "dense",
                expected: vec![in_size],
                got: input.shape.clone(),
            });
        }
        let n = input.batch();
        let w = &self.weights.value.data;
        let mut z = Tensor::zeros(&[n, units]);
        for s in 0..n {
            let x = input.item(s);
            let row = &mut z.data[s * units..(s + 1) * units];
            row.copy_from_slice(&self.biases.value.data);
            for (i, &xv) in x.iter().enumerate() {
                if xv == 0.0 {
                    continue;
                }
                let w_row = &w[i * units..(i + 1) * units];
                for (acc, wv) in row.iter_mut().zip(w_row) {
                    *acc += xv * wv;
                }
            }
        }

        let mut a = z.map(|x| self.activator.function(x));
        if self.activator == ActivationFunction::Softmax {
            for s in 0..n {
                softmax_in_place(&mut a.data[s * units..(s + 1) * units]);
            }
        }
        if mode == Mode::Train {
            self.input = Some(input.clone());
            self.pre_activation = Some(z);
        }
        Ok(a)
    }

    /// Accumulates parameter gradients and returns ∂L/∂x.
    /// `grad` is ∂L/∂a for this layer (error in activation space).
    pub fn backward(&mut self, grad: &Tensor) -> Result<Tensor, NetworkError> {
        let (input, z) = match (self.input.take(), self.pre_activation.take()) {
            (Some(i), Some(z)) => (i, z),
            _ => return Err(NetworkError::MissingForward("dense")),
        };
        let in_size = self.weights.value.shape[0];
        let units = self.units();
        let n = input.batch();

        // δ = error ⊙ f'(z)
        let delta: Vec<f32> = grad
            .data
            .iter()
            .zip(&z.data)
            .map(|(g, zv)| g * self.activator.derivative(*zv))
            .collect();

        let mut dx = Tensor::zeros(&[n, in_size]);
        let w = &self.weights.value.data;
        let dw = &mut self.weights.grad.data;
        for s in 0..n {
            let x = input.item(s);
            let d = &delta[s * units..(s + 1) * units];
            for (bg, dv) in self.biases.grad.data.iter_mut().zip(d) {
                *bg += dv;
            }
            let dx_row = &mut dx.data[s * in_size..(s + 1) * in_size];
            for i in 0..in_size {
                let w_row = &w[i * units..(i + 1) * units];
                let dw_row = &mut dw[i * units..(i + 1) * units];
                let mut acc = 0.0;
                for j in 0..units {
                    dw_row[j] += x[i] * d[j];
                    acc += d[j] * w_row[j];
                }
                dx_row[i] = acc;
            }
        }
        Ok(dx)
    }

    pub fn clear_cache(&mut self) {
        self.input = None;
        self.pre_activation = None;
    }
}
