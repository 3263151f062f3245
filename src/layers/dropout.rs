use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::math::Matrix;

/// Inverted dropout: during training each unit is zeroed with probability
/// `rate` and the survivors are scaled by `1 / (1 - rate)`, so inference is
/// the identity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dropout {
    pub rate: f32,
}

impl Dropout {
    pub fn new(rate: f32) -> Dropout {
        Dropout { rate }
    }

    /// Returns the dropped-out activations and the mask that was applied.
    pub fn forward_train<R: Rng + ?Sized>(&self, input: &Matrix, rng: &mut R) -> (Matrix, Vec<f32>) {
        if self.rate <= 0.0 {
            return (input.clone(), vec![1.0; input.data.len()]);
        }
        let keep = 1.0 - self.rate;
        let scale = 1.0 / keep;
        let mask: Vec<f32> = (0..input.data.len())
            .map(|_| if rng.gen::<f32>() < keep { scale } else { 0.0 })
            .collect();
        let data = input.data.iter().zip(&mask).map(|(x, m)| x * m).collect();
        (Matrix::from_vec(input.rows, input.cols, data), mask)
    }

    pub fn backward(&self, mask: &[f32], mut grad_output: Matrix) -> Matrix {
        for (g, m) in grad_output.data.iter_mut().zip(mask) {
            *g *= m;
        }
        grad_output
    }
}
