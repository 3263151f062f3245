use serde::{Serialize, Deserialize};

use crate::math::Matrix;

/// Batch normalisation over the feature axis of a `batch × features` matrix.
///
/// Training normalises with the statistics of the current batch and folds
/// them into the moving averages; inference uses the moving averages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchNorm {
    pub features: usize,
    pub momentum: f32,
    pub epsilon: f32,
    pub gamma: Vec<f32>,
    pub beta: Vec<f32>,
    pub moving_mean: Vec<f32>,
    pub moving_variance: Vec<f32>,
}

/// What the backward pass needs from a training forward pass.
#[derive(Debug, Clone)]
pub struct BatchNormCache {
    normalized: Matrix,
    inv_std: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchNormGradients {
    pub gamma: Vec<f32>,
    pub beta: Vec<f32>,
}

impl BatchNorm {
    pub fn new(features: usize, momentum: f32, epsilon: f32) -> BatchNorm {
        BatchNorm {
            features,
            momentum,
            epsilon,
            gamma: vec![1.0; features],
            beta: vec![0.0; features],
            moving_mean: vec![0.0; features],
            moving_variance: vec![1.0; features],
        }
    }

    pub fn forward_train(&mut self, input: &Matrix) -> (Matrix, BatchNormCache) {
        assert_eq!(input.cols, self.features, "BatchNorm feature mismatch");
        let n = input.rows as f32;

        let mean: Vec<f32> = input.column_sums().into_iter().map(|s| s / n).collect();
        let mut variance = vec![0.0f32; self.features];
        for r in 0..input.rows {
            for ((v, &x), &m) in variance.iter_mut().zip(input.row(r)).zip(&mean) {
                *v += (x - m) * (x - m);
            }
        }
        for v in variance.iter_mut() {
            *v /= n;
        }

        let inv_std: Vec<f32> = variance.iter().map(|v| 1.0 / (v + self.epsilon).sqrt()).collect();
        let mut normalized = Matrix::zeros(input.rows, input.cols);
        let mut output = Matrix::zeros(input.rows, input.cols);
        for r in 0..input.rows {
            for j in 0..self.features {
                let x_hat = (input.row(r)[j] - mean[j]) * inv_std[j];
                normalized.row_mut(r)[j] = x_hat;
                output.row_mut(r)[j] = self.gamma[j] * x_hat + self.beta[j];
            }
        }

        let m = self.momentum;
        for j in 0..self.features {
            self.moving_mean[j] = m * self.moving_mean[j] + (1.0 - m) * mean[j];
            self.moving_variance[j] = m * self.moving_variance[j] + (1.0 - m) * variance[j];
        }

        (output, BatchNormCache { normalized, inv_std })
    }

    pub fn forward_inference(&self, input: &Matrix) -> Matrix {
        assert_eq!(input.cols, self.features, "BatchNorm feature mismatch");
        let scale: Vec<f32> = self.gamma.iter()
            .zip(&self.moving_variance)
            .map(|(g, v)| g / (v + self.epsilon).sqrt())
            .collect();

        let mut output = input.clone();
        for r in 0..output.rows {
            for (j, x) in output.row_mut(r).iter_mut().enumerate() {
                *x = (*x - self.moving_mean[j]) * scale[j] + self.beta[j];
            }
        }
        output
    }

    /// dx = inv_std / N · (N·dx̂ − Σdx̂ − x̂·Σ(dx̂·x̂)),  with dx̂ = dy·γ.
    pub fn backward(&self, cache: &BatchNormCache, grad_output: &Matrix) -> (Matrix, BatchNormGradients) {
        let n = grad_output.rows as f32;
        let x_hat = &cache.normalized;

        let beta_grad = grad_output.column_sums();
        let gamma_grad = grad_output.hadamard(x_hat).column_sums();

        let mut grad_input = Matrix::zeros(grad_output.rows, grad_output.cols);
        for r in 0..grad_output.rows {
            for j in 0..self.features {
                // Σdx̂ = γ·Σdy and Σ(dx̂·x̂) = γ·Σ(dy·x̂)
                let dx_hat = grad_output.row(r)[j] * self.gamma[j];
                grad_input.row_mut(r)[j] = cache.inv_std[j] / n
                    * (n * dx_hat
                        - self.gamma[j] * beta_grad[j]
                        - x_hat.row(r)[j] * self.gamma[j] * gamma_grad[j]);
            }
        }

        (grad_input, BatchNormGradients { gamma: gamma_grad, beta: beta_grad })
    }
}
