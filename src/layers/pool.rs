use crate::layers::Mode;
use crate::math::Tensor;
use crate::network::NetworkError;

fn check_rank4(input: &Tensor, layer: &'static str) -> Result<(usize, usize, usize, usize), NetworkError> {
    if input.shape.len() != 4 {
        return Err(NetworkError::InputShape { layer, expected: vec![0, 0, 0, 0], got: input.shape.clone() });
    }
    Ok((input.shape[0], input.shape[1], input.shape[2], input.shape[3]))
}

/// Max pooling with a square window and equal stride, "valid" padding.
#[derive(Debug, Clone)]
pub struct MaxPool2d {
    pub pool_size: usize,
    input_shape: Option<Vec<usize>>,
    argmax: Vec<usize>, // flat input index chosen for each output element
}

impl MaxPool2d {
    pub fn new(pool_size: usize) -> MaxPool2d {
        MaxPool2d { pool_size, input_shape: None, argmax: Vec::new() }
    }

    pub fn forward(&mut self, input: &Tensor, mode: Mode) -> Result<Tensor, NetworkError> {
        let (n, h, w, c) = check_rank4(input, "max_pool2d")?;
        let p = self.pool_size;
        let (oh, ow) = (h / p, w / p);
        if oh == 0 || ow == 0 {
            return Err(NetworkError::InputShape { layer: "max_pool2d", expected: vec![p, p], got: input.shape.clone() });
        }
        let mut out = Tensor::zeros(&[n, oh, ow, c]);
        let mut argmax = vec![0usize; out.len()];
        for b in 0..n {
            for oy in 0..oh {
                for ox in 0..ow {
                    for ci in 0..c {
                        let mut best_idx = ((b * h + oy * p) * w + ox * p) * c + ci;
                        let mut best = input.data[best_idx];
                        for py in 0..p {
                            for px in 0..p {
                                let idx = ((b * h + oy * p + py) * w + ox * p + px) * c + ci;
                                if input.data[idx] > best {
                                    best = input.data[idx];
                                    best_idx = idx;
                                }
                            }
                        }
                        let o = ((b * oh + oy) * ow + ox) * c + ci;
                        out.data[o] = best;
                        argmax[o] = best_idx;
                    }
                }
            }
        }
        if mode == Mode::Train {
            self.input_shape = Some(input.shape.clone());
            self.argmax = argmax;
        }
        Ok(out)
    }

    pub fn backward(&mut self, grad: &Tensor) -> Result<Tensor, NetworkError> {
        let shape = self.input_shape.take().ok_or(NetworkError::MissingForward("max_pool2d"))?;
        let mut dx = Tensor::zeros(&shape);
        for (g, &src) in grad.data.iter().zip(&self.argmax) {
            dx.data[src] += g;
        }
        self.argmax = Vec::new();
        Ok(dx)
    }

    pub fn clear_cache(&mut self) {
        self.input_shape = None;
        self.argmax = Vec::new();
    }
}

/// Averages every channel over the spatial dimensions: `[N,h,w,c] → [N,c]`.
#[derive(Debug, Clone, Default)]
pub struct GlobalAvgPool {
    input_shape: Option<Vec<usize>>,
}

impl GlobalAvgPool {
    pub fn forward(&mut self, input: &Tensor, mode: Mode) -> Result<Tensor, NetworkError> {
        let (n, h, w, c) = check_rank4(input, "global_avg_pool")?;
        let area = (h * w) as f32;
        let mut out = Tensor::zeros(&[n, c]);
        for b in 0..n {
            for pos in 0..h * w {
                let base = (b * h * w + pos) * c;
                for ci in 0..c {
                    out.data[b * c + ci] += input.data[base + ci];
                }
            }
        }
        out.data.iter_mut().for_each(|v| *v /= area);
        if mode == Mode::Train {
            self.input_shape = Some(input.shape.clone());
        }
        Ok(out)
    }

    pub fn backward(&mut self, grad: &Tensor) -> Result<Tensor, NetworkError> {
        let shape = self.input_shape.take().ok_or(NetworkError::MissingForward("global_avg_pool"))?;
        let (n, h, w, c) = (shape[0], shape[1], shape[2], shape[3]);
        let area = (h * w) as f32;
        let mut dx = Tensor::zeros(&shape);
        for b in 0..n {
            for pos in 0..h * w {
                let base = (b * h * w + pos) * c;
                for ci in 0..c {
                    dx.data[base + ci] = grad.data[b * c + ci] / area;
                }
            }
        }
        Ok(dx)
    }

    pub fn clear_cache(&mut self) {
        self.input_shape = None;
    }
}

/// Collapses every non-batch dimension: `[N, ...] → [N, prod(...)]`.
#[derive(Debug, Clone, Default)]
pub struct Flatten {
    input_shape: Option<Vec<usize>>,
}

impl Flatten {
    pub fn forward(&mut self, input: &Tensor, mode: Mode) -> Result<Tensor, NetworkError> {
        if mode == Mode::Train {
            self.input_shape = Some(input.shape.clone());
        }
        let shape = vec![input.batch(), input.item_len()];
        Ok(input.clone().reshape(shape)?)
    }

    pub fn backward(&mut self, grad: &Tensor) -> Result<Tensor, NetworkError> {
        let shape = self.input_shape.take().ok_or(NetworkError::MissingForward("flatten"))?;
        Ok(grad.clone().reshape(shape)?)
    }

    pub fn clear_cache(&mut self) {
        self.input_shape = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_pool_routes_gradient_to_winner() {
        let mut pool = MaxPool2d::new(2);
        let x = Tensor::new(vec![1, 2, 2, 1], vec![0.1, 0.9, 0.3, 0.2]).unwrap();
        let out = pool.forward(&x, Mode::Train).unwrap();
        assert_eq!(out.data, vec![0.9]);
        let dx = pool.backward(&Tensor::filled(&[1, 1, 1, 1], 2.0)).unwrap();
        assert_eq!(dx.data, vec![0.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn max_pool_rejects_too_small_input() {
        let mut pool = MaxPool2d::new(2);
        assert!(pool.forward(&Tensor::zeros(&[1, 1, 4, 1]), Mode::Eval).is_err());
    }

    #[test]
    fn global_avg_pool_averages_channels() {
        let mut gap = GlobalAvgPool::default();
        let x = Tensor::new(vec![1, 2, 1, 2], vec![1.0, 10.0, 3.0, 20.0]).unwrap();
        let out = gap.forward(&x, Mode::Train).unwrap();
        assert_eq!(out.shape, vec![1, 2]);
        assert_eq!(out.data, vec![2.0, 15.0]);
        let dx = gap.backward(&Tensor::new(vec![1, 2], vec![2.0, 4.0]).unwrap()).unwrap();
        assert_eq!(dx.data, vec![1.0, 2.0, 1.0, 2.0]);
    }

    #[test]
    fn flatten_round_trips_shape() {
        let mut flat = Flatten::default();
        let x = Tensor::zeros(&[3, 2, 2, 1]);
        let out = flat.forward(&x, Mode::Train).unwrap();
        assert_eq!(out.shape, vec![3, 4]);
        let back = flat.backward(&out).unwrap();
        assert_eq!(back.shape, vec![3, 2, 2, 1]);
    }
}
