use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activation::ActivationFunction;
use crate::math::init::glorot_uniform;
use crate::math::Tensor3;

/// 2-D convolution with `valid` padding and stride 1.
///
/// The kernel is stored flat in `[ky][kx][in_channel][filter]` order so the
/// innermost loop of both passes runs over contiguous filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conv2d {
    pub in_channels: usize,
    pub filters: usize,
    pub kernel_size: usize,
    pub weights: Vec<f32>,
    pub biases: Vec<f32>,
    pub activator: ActivationFunction,
}

/// Parameter gradients of one `Conv2d`, same layout as the layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvGradients {
    pub weights: Vec<f32>,
    pub biases: Vec<f32>,
}

impl Conv2d {
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        filters: usize,
        kernel_size: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Conv2d {
        let receptive = kernel_size * kernel_size;
        let weights = glorot_uniform(
            receptive * in_channels * filters,
            receptive * in_channels,
            receptive * filters,
            rng,
        );

        Conv2d {
            in_channels,
            filters,
            kernel_size,
            weights,
            biases: vec![0.0; filters],
            activator: activation,
        }
    }

    /// Spatial size produced for an input of `height × width`.
    pub fn output_size(&self, height: usize, width: usize) -> (usize, usize) {
        (
            (height + 1).saturating_sub(self.kernel_size),
            (width + 1).saturating_sub(self.kernel_size),
        )
    }

    #[inline]
    fn kernel_row(&self, ky: usize, kx: usize, ic: usize) -> &[f32] {
        let start = ((ky * self.kernel_size + kx) * self.in_channels + ic) * self.filters;
        &self.weights[start..start + self.filters]
    }

    pub fn forward(&self, input: &Tensor3) -> Tensor3 {
        assert_eq!(input.channels, self.in_channels, "Conv2d input channel mismatch");
        let (oh, ow) = self.output_size(input.height, input.width);
        let mut out = Tensor3::zeros(oh, ow, self.filters);

        for oy in 0..oh {
            for ox in 0..ow {
                let acc = out.pixel_mut(oy, ox);
                acc.copy_from_slice(&self.biases);

                for ky in 0..self.kernel_size {
                    for kx in 0..self.kernel_size {
                        let px = input.pixel(oy + ky, ox + kx);
                        for (ic, &v) in px.iter().enumerate() {
                            if v == 0.0 {
                                continue;
                            }
                            for (a, &w) in acc.iter_mut().zip(self.kernel_row(ky, kx, ic)) {
                                *a += v * w;
                            }
                        }
                    }
                }

                self.activator.apply(acc);
            }
        }

        out
    }

    /// Backward pass for one sample.
    ///
    /// `output` is what `forward(input)` returned and `grad_output` is ∂L/∂output.
    /// The input gradient is only computed when `input_grad` is set; the first
    /// layer of a network has no use for it.
    pub fn backward(
        &self,
        input: &Tensor3,
        output: &Tensor3,
        mut grad_output: Tensor3,
        input_grad: bool,
    ) -> (Option<Tensor3>, ConvGradients) {
        self.activator.backward(&output.data, &mut grad_output.data);
        let delta = grad_output;

        let mut grads = ConvGradients {
            weights: vec![0.0; self.weights.len()],
            biases: vec![0.0; self.filters],
        };
        let mut grad_input = if input_grad {
            Some(Tensor3::zeros(input.height, input.width, input.channels))
        } else {
            None
        };

        let f = self.filters;
        for oy in 0..delta.height {
            for ox in 0..delta.width {
                let d = delta.pixel(oy, ox);
                if d.iter().all(|&v| v == 0.0) {
                    continue;
                }
                for (gb, &dv) in grads.biases.iter_mut().zip(d) {
                    *gb += dv;
                }

                for ky in 0..self.kernel_size {
                    for kx in 0..self.kernel_size {
                        let (iy, ix) = (oy + ky, ox + kx);
                        let px = input.pixel(iy, ix);
                        for (ic, &v) in px.iter().enumerate() {
                            let start = ((ky * self.kernel_size + kx) * self.in_channels + ic) * f;
                            if v != 0.0 {
                                for (gw, &dv) in grads.weights[start..start + f].iter_mut().zip(d) {
                                    *gw += v * dv;
                                }
                            }
                            if let Some(gi) = grad_input.as_mut() {
                                let s: f32 = self.weights[start..start + f].iter()
                                    .zip(d)
                                    .map(|(w, dv)| w * dv)
                                    .sum();
                                gi.pixel_mut(iy, ix)[ic] += s;
                            }
                        }
                    }
                }
            }
        }

        (grad_input, grads)
    }
}
