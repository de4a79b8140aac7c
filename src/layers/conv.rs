use rand::rngs::StdRng;

use crate::activation::ActivationFunction;
use crate::layers::{Mode, Param};
use crate::math::Tensor;
use crate::network::NetworkError;

/// Output size and leading padding of a "same" convolution along one axis.
pub fn same_geometry(input: usize, kernel: usize, stride: usize) -> (usize, usize) {
    let out = input.div_ceil(stride);
    let pad_total = ((out.saturating_sub(1)) * stride + kernel).saturating_sub(input);
    (out, pad_total / 2)
}

/// Spatial bookkeeping shared by both convolution kinds.
#[derive(Debug, Clone, Copy)]
struct Geometry {
    n: usize,
    h: usize,
    w: usize,
    c: usize,
    oh: usize,
    ow: usize,
    pad_top: usize,
    pad_left: usize,
}

impl Geometry {
    fn of(input: &Tensor, kernel: usize, stride: usize) -> Geometry {
        let (n, h, w, c) = (input.shape[0], input.shape[1], input.shape[2], input.shape[3]);
        let (oh, pad_top) = same_geometry(h, kernel, stride);
        let (ow, pad_left) = same_geometry(w, kernel, stride);
        Geometry { n, h, w, c, oh, ow, pad_top, pad_left }
    }

    /// Input coordinate for an output position and kernel offset, if inside the image.
    fn source(&self, o: usize, k: usize, stride: usize, pad: usize, limit: usize) -> Option<usize> {
        let pos = (o * stride + k) as isize - pad as isize;
        if pos < 0 || pos as usize >= limit {
            None
        } else {
            Some(pos as usize)
        }
    }
}

fn check_rank4(input: &Tensor, layer: &'static str, channels: usize) -> Result<(), NetworkError> {
    if input.shape.len() != 4 || input.shape[3] != channels {
        return Err(NetworkError::InputShape {
            layer,
            expected: vec![channels],
            got: input.shape.clone(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Standard convolution
// ---------------------------------------------------------------------------

/// 2D convolution with "same" padding over NHWC input.
#[derive(Debug, Clone)]
pub struct Conv2d {
    pub kernel: Param, // [k, k, in_channels, filters]
    pub biases: Param, // [filters]
    pub kernel_size: usize,
    pub stride: usize,
    pub activator: ActivationFunction,
    input: Option<Tensor>,
    pre_activation: Option<Tensor>,
}

impl Conv2d {
    pub fn new(
        filters: usize,
        kernel_size: usize,
        stride: usize,
        in_channels: usize,
        activator: ActivationFunction,
        rng: &mut StdRng,
    ) -> Conv2d {
        let fan_in = kernel_size * kernel_size * in_channels;
        let shape = [kernel_size, kernel_size, in_channels, filters];
        let kernel = match activator {
            ActivationFunction::ReLU => Tensor::he(&shape, fan_in, rng),
            _ => Tensor::xavier(&shape, fan_in, rng),
        };
        Conv2d {
            kernel: Param::new(kernel),
            biases: Param::new(Tensor::zeros(&[filters])),
            kernel_size,
            stride,
            activator,
            input: None,
            pre_activation: None,
        }
    }

    fn in_channels(&self) -> usize {
        self.kernel.value.shape[2]
    }

    fn filters(&self) -> usize {
        self.kernel.value.shape[3]
    }

    pub fn forward(&mut self, input: &Tensor, mode: Mode) -> Result<Tensor, NetworkError> {
        check_rank4(input, "conv2d", self.in_channels())?;
        let g = Geometry::of(input, self.kernel_size, self.stride);
        let (k, s, f) = (self.kernel_size, self.stride, self.filters());
        let w = &self.kernel.value.data;
        let mut z = Tensor::zeros(&[g.n, g.oh, g.ow, f]);

        for b in 0..g.n {
            for oy in 0..g.oh {
                for ox in 0..g.ow {
                    let out_base = ((b * g.oh + oy) * g.ow + ox) * f;
                    let acc = &mut z.data[out_base..out_base + f];
                    acc.copy_from_slice(&self.biases.value.data);
                    for ky in 0..k {
                        let Some(iy) = g.source(oy, ky, s, g.pad_top, g.h) else { continue };
                        for kx in 0..k {
                            let Some(ix) = g.source(ox, kx, s, g.pad_left, g.w) else { continue };
                            let in_base = ((b * g.h + iy) * g.w + ix) * g.c;
                            for ci in 0..g.c {
                                let xv = input.data[in_base + ci];
                                if xv == 0.0 {
                                    continue;
                                }
                                let w_base = ((ky * k + kx) * g.c + ci) * f;
                                for (a, wv) in acc.iter_mut().zip(&w[w_base..w_base + f]) {
                                    *a += xv * wv;
                                }
                            }
                        }
                    }
                }
            }
        }

        let a = z.map(|x| self.activator.function(x));
        if mode == Mode::Train {
            self.input = Some(input.clone());
            self.pre_activation = Some(z);
        }
        Ok(a)
    }

    pub fn backward(&mut self, grad: &Tensor) -> Result<Tensor, NetworkError> {
        let (input, z) = match (self.input.take(), self.pre_activation.take()) {
            (Some(i), Some(z)) => (i, z),
            _ => return Err(NetworkError::MissingForward("conv2d")),
        };
        let g = Geometry::of(&input, self.kernel_size, self.stride);
        let (k, s, f) = (self.kernel_size, self.stride, self.filters());
        let delta: Vec<f32> = grad
            .data
            .iter()
            .zip(&z.data)
            .map(|(gv, zv)| gv * self.activator.derivative(*zv))
            .collect();

        let mut dx = Tensor::zeros(&input.shape);
        let w = &self.kernel.value.data;
        let dw = &mut self.kernel.grad.data;
        let db = &mut self.biases.grad.data;

        for b in 0..g.n {
            for oy in 0..g.oh {
                for ox in 0..g.ow {
                    let out_base = ((b * g.oh + oy) * g.ow + ox) * f;
                    let d = &delta[out_base..out_base + f];
                    for (bg, dv) in db.iter_mut().zip(d) {
                        *bg += dv;
                    }
                    for ky in 0..k {
                        let Some(iy) = g.source(oy, ky, s, g.pad_top, g.h) else { continue };
                        for kx in 0..k {
                            let Some(ix) = g.source(ox, kx, s, g.pad_left, g.w) else { continue };
                            let in_base = ((b * g.h + iy) * g.w + ix) * g.c;
                            for ci in 0..g.c {
                                let xv = input.data[in_base + ci];
                                let w_base = ((ky * k + kx) * g.c + ci) * f;
                                let mut acc = 0.0;
                                for j in 0..f {
                                    dw[w_base + j] += xv * d[j];
                                    acc += w[w_base + j] * d[j];
                                }
                                dx.data[in_base + ci] += acc;
                            }
                        }
                    }
                }
            }
        }
        Ok(dx)
    }

    pub fn clear_cache(&mut self) {
        self.input = None;
        self.pre_activation = None;
    }
}

// ---------------------------------------------------------------------------
// Depthwise convolution
// ---------------------------------------------------------------------------

/// Per-channel 2D convolution with "same" padding (channel multiplier 1).
#[derive(Debug, Clone)]
pub struct DepthwiseConv2d {
    pub kernel: Param, // [k, k, channels]
    pub biases: Param, // [channels]
    pub kernel_size: usize,
    pub stride: usize,
    pub activator: ActivationFunction,
    input: Option<Tensor>,
    pre_activation: Option<Tensor>,
}

impl DepthwiseConv2d {
    pub fn new(
        kernel_size: usize,
        stride: usize,
        channels: usize,
        activator: ActivationFunction,
        rng: &mut StdRng,
    ) -> DepthwiseConv2d {
        let fan_in = kernel_size * kernel_size;
        let shape = [kernel_size, kernel_size, channels];
        let kernel = match activator {
            ActivationFunction::ReLU => Tensor::he(&shape, fan_in, rng),
            _ => Tensor::xavier(&shape, fan_in, rng),
        };
        DepthwiseConv2d {
            kernel: Param::new(kernel),
            biases: Param::new(Tensor::zeros(&[channels])),
            kernel_size,
            stride,
            activator,
            input: None,
            pre_activation: None,
        }
    }

    fn channels(&self) -> usize {
        self.kernel.value.shape[2]
    }

    pub fn forward(&mut self, input: &Tensor, mode: Mode) -> Result<Tensor, NetworkError> {
        check_rank4(input, "depthwise_conv2d", self.channels())?;
        let g = Geometry::of(input, self.kernel_size, self.stride);
        let (k, s, c) = (self.kernel_size, self.stride, g.c);
        let w = &self.kernel.value.data;
        let mut z = Tensor::zeros(&[g.n, g.oh, g.ow, c]);

        for b in 0..g.n {
            for oy in 0..g.oh {
                for ox in 0..g.ow {
                    let out_base = ((b * g.oh + oy) * g.ow + ox) * c;
                    let acc = &mut z.data[out_base..out_base + c];
                    acc.copy_from_slice(&self.biases.value.data);
                    for ky in 0..k {
                        let Some(iy) = g.source(oy, ky, s, g.pad_top, g.h) else { continue };
                        for kx in 0..k {
                            let Some(ix) = g.source(ox, kx, s, g.pad_left, g.w) else { continue };
                            let in_base = ((b * g.h + iy) * g.w + ix) * c;
                            let w_base = (ky * k + kx) * c;
                            for ci in 0..c {
                                acc[ci] += input.data[in_base + ci] * w[w_base + ci];
                            }
                        }
                    }
                }
            }
        }

        let a = z.map(|x| self.activator.function(x));
        if mode == Mode::Train {
            self.input = Some(input.clone());
            self.pre_activation = Some(z);
        }
        Ok(a)
    }

    pub fn backward(&mut self, grad: &Tensor) -> Result<Tensor, NetworkError> {
        let (input, z) = match (self.input.take(), self.pre_activation.take()) {
            (Some(i), Some(z)) => (i, z),
            _ => return Err(NetworkError::MissingForward("depthwise_conv2d")),
        };
        let g = Geometry::of(&input, self.kernel_size, self.stride);
        let (k, s, c) = (self.kernel_size, self.stride, g.c);
        let delta: Vec<f32> = grad
            .data
            .iter()
            .zip(&z.data)
            .map(|(gv, zv)| gv * self.activator.derivative(*zv))
            .collect();

        let mut dx = Tensor::zeros(&input.shape);
        let w = &self.kernel.value.data;
        let dw = &mut self.kernel.grad.data;
        let db = &mut self.biases.grad.data;

        for b in 0..g.n {
            for oy in 0..g.oh {
                for ox in 0..g.ow {
                    let out_base = ((b * g.oh + oy) * g.ow + ox) * c;
                    let d = &delta[out_base..out_base + c];
                    for (bg, dv) in db.iter_mut().zip(d) {
                        *bg += dv;
                    }
                    for ky in 0..k {
                        let Some(iy) = g.source(oy, ky, s, g.pad_top, g.h) else { continue };
                        for kx in 0..k {
                            let Some(ix) = g.source(ox, kx, s, g.pad_left, g.w) else { continue };
                            let in_base = ((b * g.h + iy) * g.w + ix) * c;
                            let w_base = (ky * k + kx) * c;
                            for ci in 0..c {
                                dw[w_base + ci] += input.data[in_base + ci] * d[ci];
                                dx.data[in_base + ci] += w[w_base + ci] * d[ci];
                            }
                        }
                    }
                }
            }
        }
        Ok(dx)
    }

    pub fn clear_cache(&mut self) {
        self.input = None;
        self.pre_activation = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn same_geometry_matches_ceil_division() {
        assert_eq!(same_geometry(8, 3, 1), (8, 1));
        assert_eq!(same_geometry(8, 3, 2), (4, 0));
        assert_eq!(same_geometry(7, 3, 2), (4, 1));
        assert_eq!(same_geometry(1, 3, 2), (1, 1));
    }

    #[test]
    fn conv_preserves_spatial_size_with_stride_one() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut conv = Conv2d::new(4, 3, 1, 2, ActivationFunction::ReLU, &mut rng);
        let out = conv.forward(&Tensor::filled(&[2, 5, 5, 2], 0.5), Mode::Eval).unwrap();
        assert_eq!(out.shape, vec![2, 5, 5, 4]);
        assert!(out.data.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn identity_kernel_copies_input() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut conv = Conv2d::new(1, 3, 1, 1, ActivationFunction::Identity, &mut rng);
        conv.kernel.value.data.iter_mut().for_each(|v| *v = 0.0);
        conv.kernel.value.data[4] = 1.0; // centre tap
        let x = Tensor::new(vec![1, 2, 2, 1], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let out = conv.forward(&x, Mode::Eval).unwrap();
        assert_eq!(out.data, x.data);
    }

    fn conv_loss(conv: &mut Conv2d, x: &Tensor) -> f32 {
        conv.forward(x, Mode::Eval).unwrap().data.iter().map(|v| v * v).sum::<f32>() * 0.5
    }

    #[test]
    fn conv_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut conv = Conv2d::new(2, 3, 2, 2, ActivationFunction::Identity, &mut rng);
        let x = Tensor::he(&[1, 4, 4, 2], 4, &mut rng);
        let a = conv.forward(&x, Mode::Train).unwrap();
        conv.backward(&a).unwrap();

        let h = 1e-3;
        for idx in [0usize, 7, 20, 35] {
            let orig = conv.kernel.value.data[idx];
            conv.kernel.value.data[idx] = orig + h;
            let up = conv_loss(&mut conv, &x);
            conv.kernel.value.data[idx] = orig - h;
            let down = conv_loss(&mut conv, &x);
            conv.kernel.value.data[idx] = orig;
            let numeric = (up - down) / (2.0 * h);
            assert!((numeric - conv.kernel.grad.data[idx]).abs() < 2e-2, "kernel {idx}");
        }
    }

    #[test]
    fn depthwise_halves_spatial_size_with_stride_two() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut dw = DepthwiseConv2d::new(3, 2, 3, ActivationFunction::ReLU, &mut rng);
        let x = Tensor::filled(&[1, 6, 6, 3], 1.0);
        let out = dw.forward(&x, Mode::Train).unwrap();
        assert_eq!(out.shape, vec![1, 3, 3, 3]);
        let dx = dw.backward(&Tensor::filled(&out.shape, 1.0)).unwrap();
        assert_eq!(dx.shape, x.shape);
    }
}
