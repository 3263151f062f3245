use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activation::ActivationFunction;
use crate::math::init::glorot_uniform;
use crate::math::Matrix;

/// Fully connected layer operating on a whole mini-batch (`batch × inputs`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    pub size: usize,
    /// Shape `inputs × size`.
    pub weights: Matrix,
    pub biases: Vec<f32>,
    pub activator: ActivationFunction,
    /// L2 factor on the kernel; `0.0` disables the penalty.
    #[serde(default)]
    pub l2: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DenseGradients {
    pub weights: Matrix,
    pub biases: Vec<f32>,
}

impl Dense {
    pub fn new<R: Rng + ?Sized>(
        size: usize,
        input_size: usize,
        activation: ActivationFunction,
        l2: f32,
        rng: &mut R,
    ) -> Dense {
        let weights = Matrix::from_vec(
            input_size,
            size,
            glorot_uniform(input_size * size, input_size, size, rng),
        );

        Dense {
            size,
            weights,
            biases: vec![0.0; size],
            activator: activation,
            l2,
        }
    }

    /// `activation(x·W + b)`, applied row by row.
    pub fn forward(&self, input: &Matrix) -> Matrix {
        let mut z = input.matmul(&self.weights);
        z.add_row(&self.biases);
        for i in 0..z.rows {
            self.activator.apply(z.row_mut(i));
        }
        z
    }

    /// Regularisation term this layer adds to the loss: `l2 · Σw²`.
    pub fn penalty(&self) -> f32 {
        if self.l2 == 0.0 {
            return 0.0;
        }
        self.l2 * self.weights.data.iter().map(|w| w * w).sum::<f32>()
    }

    /// Given ∂L/∂output, returns ∂L/∂input and the parameter gradients.
    /// The kernel gradient includes the L2 term `2 · l2 · W`.
    pub fn backward(
        &self,
        input: &Matrix,
        output: &Matrix,
        mut grad_output: Matrix,
    ) -> (Matrix, DenseGradients) {
        for i in 0..grad_output.rows {
            self.activator.backward(output.row(i), grad_output.row_mut(i));
        }
        let delta = grad_output;

        let mut weights_grad = input.t_matmul(&delta);
        if self.l2 != 0.0 {
            let k = 2.0 * self.l2;
            for (g, w) in weights_grad.data.iter_mut().zip(&self.weights.data) {
                *g += k * w;
            }
        }
        let biases_grad = delta.column_sums();
        let input_grad = delta.matmul_t(&self.weights);

        (input_grad, DenseGradients { weights: weights_grad, biases: biases_grad })
    }
}
