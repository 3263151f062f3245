use serde::{Serialize, Deserialize};

use crate::math::Tensor3;

/// Max pooling with a square window and stride equal to the window.
/// Trailing rows/columns that do not fill a window are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxPool2d {
    pub pool_size: usize,
}

impl MaxPool2d {
    pub fn new(pool_size: usize) -> MaxPool2d {
        MaxPool2d { pool_size }
    }

    pub fn output_size(&self, height: usize, width: usize) -> (usize, usize) {
        (height / self.pool_size, width / self.pool_size)
    }

    /// Returns the pooled tensor and, for every output value, the flat index
    /// of the input value it was taken from.
    pub fn forward(&self, input: &Tensor3) -> (Tensor3, Vec<usize>) {
        let (oh, ow) = self.output_size(input.height, input.width);
        let c = input.channels;
        let mut out = Tensor3::zeros(oh, ow, c);
        let mut switches = vec![0usize; oh * ow * c];

        for oy in 0..oh {
            for ox in 0..ow {
                let base = out.offset(oy, ox);
                for ch in 0..c {
                    let mut best = f32::NEG_INFINITY;
                    let mut best_idx = 0;
                    for py in 0..self.pool_size {
                        for px in 0..self.pool_size {
                            let idx = input.offset(oy * self.pool_size + py, ox * self.pool_size + px) + ch;
                            if input.data[idx] > best {
                                best = input.data[idx];
                                best_idx = idx;
                            }
                        }
                    }
                    out.data[base + ch] = best;
                    switches[base + ch] = best_idx;
                }
            }
        }

        (out, switches)
    }

    /// Routes each output gradient back to the input position that won the max.
    pub fn backward(
        &self,
        input_shape: (usize, usize, usize),
        switches: &[usize],
        grad_output: &Tensor3,
    ) -> Tensor3 {
        let (h, w, c) = input_shape;
        let mut grad_input = Tensor3::zeros(h, w, c);
        for (&idx, &g) in switches.iter().zip(&grad_output.data) {
            grad_input.data[idx] += g;
        }
        grad_input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pools_each_channel_independently_and_floors_odd_sizes() {
        // 3x3x2: channel 0 counts up, channel 1 counts down.
        let data: Vec<f32> = (0..9).flat_map(|i| [i as f32, (9 - i) as f32]).collect();
        let input = Tensor3::from_vec(3, 3, 2, data);

        let (out, switches) = MaxPool2d::new(2).forward(&input);

        assert_eq!(out.shape(), (1, 1, 2));
        assert_eq!(out.data, vec![4.0, 9.0]);
        assert_eq!(switches, vec![input.offset(1, 1), input.offset(0, 0) + 1]);
    }

    #[test]
    fn backward_routes_gradient_to_winner_only() {
        let input = Tensor3::from_vec(2, 2, 1, vec![0.1, 0.7, 0.3, 0.2]);
        let pool = MaxPool2d::new(2);
        let (_, switches) = pool.forward(&input);

        let grad = pool.backward(input.shape(), &switches, &Tensor3::from_vec(1, 1, 1, vec![2.0]));
        assert_eq!(grad.data, vec![0.0, 2.0, 0.0, 0.0]);
    }
}
